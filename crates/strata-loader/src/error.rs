//! Resolution error types.
//!
//! Three outcomes, three shapes: "not found" is a typed absent value
//! (`Ok(None)`), a container that should be readable but failed is an
//! error that must reach the caller, and hot-update infeasibility is a
//! plain boolean.

use std::time::Duration;

use strata_artifact::ArtifactError;

/// Errors that can occur while resolving a name.
///
/// Absence of a name is never represented here; lookup methods return
/// `Ok(None)` for that, and the caller decides whether it matters.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// A container on the classpath failed while being read. Masking this
    /// as "not found" would hide corruption or permission problems, so it
    /// propagates.
    #[error("Container read failure in {container}: {source}")]
    Container {
        container: String,
        #[source]
        source: ArtifactError,
    },

    /// The startup gate was never signaled within the bounded wait. This
    /// indicates the surrounding system never reached a ready state and is
    /// a fatal configuration error.
    #[error("Startup gate not signaled within {0:?}")]
    StartupTimeout(Duration),
}

impl ResolveError {
    pub(crate) fn container(identity: &str, source: ArtifactError) -> Self {
        ResolveError::Container {
            container: identity.to_string(),
            source,
        }
    }
}
