//! Conversion Module
//!
//! Turns HTML into PDF through one of two interchangeable backends:
//! - a headless browser started on this host (local or serverless profile)
//! - a remote HTML-to-PDF HTTP API
//!
//! ## Usage
//!
//! ```rust,ignore
//! use html_pdf_server::conversion::{ConversionRequest, ConversionService};
//!
//! let service = ConversionService::from_config(&config);
//! let options = service.parse_options(None)?;
//! let pdf = service.convert(ConversionRequest::new("<h1>Hi</h1>", options)).await?;
//! ```

pub mod backend;
pub mod local;
pub mod options;
pub mod remote;
mod service;
mod types;

pub use backend::ConversionBackend;
pub use local::LocalBrowserBackend;
pub use options::{Length, Margins, PageFormat, RenderDefaults, RenderOptions, Viewport};
pub use remote::RemoteApiBackend;
pub use service::ConversionService;
pub use types::{ConversionError, ConversionRequest, PdfDocument, PDF_MAGIC};
