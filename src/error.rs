//! Error types for annotation surface operations.

use thiserror::Error;

use crate::model::{MarkerId, MeasurementId, Region};

/// Errors raised by store mutations and surface operations.
///
/// All of these are local and synchronous. Idempotent operations (deleting a
/// marker twice, removing a measurement that is already gone) do not produce
/// errors at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnotatorError {
    /// The active mode does not accept this kind of edit
    #[error("Operation not permitted in {mode} mode")]
    InvalidMode {
        /// Name of the mode that rejected the operation
        mode: String,
    },

    /// Counting mode needs a label selected before markers can be placed
    #[error("No label selected for counting")]
    NoLabelSelected,

    /// Marker id not present in the active store
    #[error("Unknown marker: {0}")]
    UnknownMarker(MarkerId),

    /// Measurement id is neither stored nor pending
    #[error("Unknown measurement: {0}")]
    UnknownMeasurement(MeasurementId),

    /// Workspace name is neither `required` nor `practice`
    #[error("Unknown workspace '{0}'")]
    UnknownWorkspace(String),

    /// A measurement is already being drawn
    #[error("Measurement {0} is still in progress")]
    MeasurementInProgress(MeasurementId),

    /// A margin region already holds its single measurement
    #[error("Region '{0}' already has a measurement")]
    RegionOccupied(Region),

    /// All pages of the result strip are full
    #[error("Result strip is full ({max_pages} pages of {page_size})")]
    PaginationFull {
        /// Configured page count limit
        max_pages: usize,
        /// Configured items per page
        page_size: usize,
    },

    /// Page number outside `1..=page_count`
    #[error("Page {page} out of range (total: {total})")]
    InvalidPage {
        /// Requested page (1-based)
        page: usize,
        /// Current page count
        total: usize,
    },

    /// The task image is still loading; edits are not accepted yet
    #[error("Task image is still loading")]
    ImageNotReady,

    /// Submission attempted without any markers
    #[error("Cannot submit without making annotations")]
    NothingToSubmit,

    /// A remote call failed. Local state is kept as-is.
    #[error("Remote sync failed: {0}")]
    RemoteSync(#[from] RemoteSyncError),
}

/// Failures reported by the remote task/annotation client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteSyncError {
    /// The server refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The request never reached the server or the response was lost
    #[error("Transport error: {0}")]
    Transport(String),

    /// The referenced entity does not exist remotely
    #[error("Remote entity not found: {0}")]
    NotFound(String),

    /// A payload or response could not be (de)serialized
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for RemoteSyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl AnnotatorError {
    /// Create an invalid mode error for the named mode.
    pub fn invalid_mode(mode: impl Into<String>) -> Self {
        Self::InvalidMode { mode: mode.into() }
    }
}

pub type Result<T> = std::result::Result<T, AnnotatorError>;
