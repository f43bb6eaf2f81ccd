//! Core domain types shared by every channel.
//!
//! This module contains the association data model and wire shapes, the
//! application error taxonomy, and the input validators the channels run
//! before handing text to the service.

pub mod errors;
pub mod schemas;
pub mod validators;

pub use errors::{AppError, ErrorKind};
pub use schemas::{
    AnalyzeRequest, AnalyzeResponse, Association, AssociationKind, AssociationSet,
    ProcessingResult, ProcessingStatus, RequestType, Source,
};
pub use validators::{WordValidator, MAX_WORD_LENGTH};
