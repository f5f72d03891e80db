//! Image build support.
//!
//! Provides build context packaging, registry credential selection, build
//! event decoding and an image builder that judges build success from the
//! engine's event stream.

pub mod builder;
pub mod context;
pub mod credentials;
pub mod dockerfile;
pub mod event;

pub use builder::{
    drain_build_stream, BuildOptions, BuildRequest, BuildStream, ImageBuildApi, ImageBuilder,
    DEFAULT_DOCKERFILE,
};
pub use context::ContextPackager;
pub use credentials::{known_registry_url, CredentialStore, RegistryCredentials};
pub use event::{BuildEvent, BuildItem, SUCCESS_MARKER};
