use crate::{reasoning::ReasoningError, session::SessionError, templating::TemplateError};

use miette::Diagnostic;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(Box<TemplateError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(Box<SessionError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Reasoning(Box<ReasoningError>),
}

impl From<TemplateError> for Error {
    fn from(error: TemplateError) -> Self {
        Error::Template(Box::new(error))
    }
}

impl From<SessionError> for Error {
    fn from(error: SessionError) -> Self {
        Error::Session(Box::new(error))
    }
}

impl From<ReasoningError> for Error {
    fn from(error: ReasoningError) -> Self {
        Error::Reasoning(Box::new(error))
    }
}
