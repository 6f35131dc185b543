use std::path::Path;

use crate::args::{ArgumentBuilder, BuiltArgs, MetadataInput, OVERWRITE_ORIGINAL};
use crate::domain::{FieldOutcome, InvocationErrorKind, WriteOutcome, file_type_of};
use crate::error::ExifError;
use crate::hooks::Hooks;
use crate::invoker::ToolInvoker;
use crate::tags::TagLookup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub overwrite_original: bool,
    pub verify: bool,
    pub input: MetadataInput,
}

enum WriteState {
    Validating,
    Batched,
    FallbackPerField,
    Done(Result<WriteOutcome, ExifError>),
}

impl WriteState {
    fn name(&self) -> &'static str {
        match self {
            WriteState::Validating => "validating",
            WriteState::Batched => "batched",
            WriteState::FallbackPerField => "fallback",
            WriteState::Done(_) => "done",
        }
    }
}

pub struct WriteOrchestrator<'a, I: ToolInvoker> {
    invoker: &'a I,
    tags: &'a dyn TagLookup,
    hooks: &'a Hooks,
}

impl<'a, I: ToolInvoker> WriteOrchestrator<'a, I> {
    pub fn new(invoker: &'a I, tags: &'a dyn TagLookup, hooks: &'a Hooks) -> Self {
        Self {
            invoker,
            tags,
            hooks,
        }
    }

    pub fn set_metadata(&self, file: &Path, request: &WriteRequest) -> Result<WriteOutcome, ExifError> {
        let args = ArgumentBuilder::build(&request.input);
        self.hooks.log(format!("exiftool arguments: {}", args.tokens.join(" ")));

        let mut state = if request.verify {
            WriteState::Validating
        } else {
            WriteState::Batched
        };
        loop {
            tracing::debug!(state = state.name(), file = %file.display(), "write state");
            state = match state {
                WriteState::Validating => match self.validate(file, &args) {
                    Ok(()) => WriteState::Batched,
                    Err(err) => WriteState::Done(Err(err)),
                },
                WriteState::Batched => self.batched(file, &args, request.overwrite_original),
                WriteState::FallbackPerField => {
                    WriteState::Done(self.per_field(file, &args, request.overwrite_original))
                }
                WriteState::Done(result) => return result,
            };
        }
    }

    fn validate(&self, file: &Path, args: &BuiltArgs) -> Result<(), ExifError> {
        let file_type = file_type_of(file).unwrap_or_default();
        let catalog = self.tags.catalog()?;
        for (field, _) in &args.fields {
            let reason = match catalog.lookup(&file_type, field) {
                None => "not a known tag for this file type",
                Some(record) if !record.writable => "tag is read-only",
                Some(_) => continue,
            };
            self.hooks
                .log(format!("tag verification failed: {field} on {file_type}: {reason}"));
            return Err(ExifError::TagVerificationFailed {
                field: field.clone(),
                file_type,
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    fn batched(&self, file: &Path, args: &BuiltArgs, overwrite_original: bool) -> WriteState {
        let mut tokens = args.tokens.clone();
        if overwrite_original {
            tokens.push(OVERWRITE_ORIGINAL.to_string());
        }
        match self.invoker.invoke(file, &tokens) {
            Ok(result) if result.succeeded => WriteState::Done(Ok(WriteOutcome::AllSucceeded)),
            // Retrying field by field cannot change any of these outcomes.
            Ok(result) if result.error_kind == Some(InvocationErrorKind::NothingToDo) => {
                WriteState::Done(Err(ExifError::NothingToDo))
            }
            Ok(result) if result.error_kind == Some(InvocationErrorKind::FileNotFound) => {
                WriteState::Done(Err(ExifError::FileNotFound(file.to_path_buf())))
            }
            Err(err @ (ExifError::ToolNotInstalled | ExifError::FileNotFound(_))) => {
                WriteState::Done(Err(err))
            }
            Ok(result) => {
                self.hooks.log(format!(
                    "batched write failed ({}), retrying each field",
                    result
                        .error_kind
                        .unwrap_or(InvocationErrorKind::UnknownError)
                ));
                WriteState::FallbackPerField
            }
            Err(err) => {
                self.hooks
                    .log(format!("batched write errored ({err}), retrying each field"));
                WriteState::FallbackPerField
            }
        }
    }

    fn per_field(
        &self,
        file: &Path,
        args: &BuiltArgs,
        overwrite_original: bool,
    ) -> Result<WriteOutcome, ExifError> {
        let mut outcomes = Vec::with_capacity(args.fields.len());
        for (field, value) in &args.fields {
            let tokens = ArgumentBuilder::single(field, value, overwrite_original);
            let succeeded = match self.invoker.invoke(file, &tokens) {
                Ok(result) => {
                    if !result.succeeded {
                        self.hooks.log(format!(
                            "field {field} rejected: {}",
                            result
                                .error_kind
                                .unwrap_or(InvocationErrorKind::UnknownError)
                        ));
                    }
                    result.succeeded
                }
                Err(err) => {
                    self.hooks.log(format!("field {field} errored: {err}"));
                    false
                }
            };
            outcomes.push(FieldOutcome {
                field: field.clone(),
                value: value.clone(),
                succeeded,
            });
        }

        if !outcomes.iter().any(|outcome| outcome.succeeded) {
            return Err(ExifError::FailedWriteExif {
                fields: outcomes.into_iter().map(|outcome| outcome.field).collect(),
            });
        }
        Ok(WriteOutcome::PartialResult(outcomes))
    }
}
