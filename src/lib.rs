//! Annotator - image annotation surface
//!
//! Headless core of an interactive annotation tool: point markers and
//! length measurements on a zoomable, rotatable image, per-workspace state,
//! scoring against known annotations, and synchronization with a remote
//! record store. Rendering is expressed as a queue of [`render::RenderCommand`]s
//! so any front-end can draw the result.

pub mod autosave;
pub mod collab;
pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod ground_truth;
pub mod minimap;
pub mod mode;
pub mod model;
pub mod pagination;
pub mod remote;
pub mod render;
pub mod replay;
pub mod scoring;
pub mod session;
pub mod store;
pub mod sync;
pub mod workspace;

pub use config::AnnotatorConfig;
pub use error::{AnnotatorError, Result};
pub use mode::Mode;
pub use session::AnnotationSurface;
