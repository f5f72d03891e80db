//! Traefiker CLI - blue/green deployments behind Traefik.

pub mod commands;
pub mod output;
