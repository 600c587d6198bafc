//! Mapping of service errors onto the entity and table error kinds.
//!
//! The pipeline reports failures as [`TablesError::Api`] (structured OData
//! error) or [`TablesError::Http`] (anything else). Only the operation knows
//! whether a 404 means a missing entity or a missing table, so each one
//! passes its [`Target`] here.

use azure_data_tables_core::error::TablesError;

/// What the failed request was addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Entity,
    Table,
}

/// Turn a pipeline error into the most specific error kind.
///
/// Known service codes win. Otherwise 404, 409 and 412 map by status,
/// whether or not the body carried a code. Anything else passes through untouched.
pub(crate) fn classify(err: TablesError, target: Target) -> TablesError {
    match err {
        TablesError::Api {
            status,
            code,
            message,
        } => match code.as_str() {
            "EntityAlreadyExists" => TablesError::EntityAlreadyExists(message),
            "TableAlreadyExists" => TablesError::TableAlreadyExists(message),
            "TableNotFound" => TablesError::TableNotFound(message),
            "ResourceNotFound" => not_found(target, message),
            "UpdateConditionNotSatisfied" | "ConditionNotMet" => {
                TablesError::PreconditionFailed(message)
            }
            _ => by_status(status, target, message).unwrap_or_else(|message| TablesError::Api {
                status,
                code,
                message,
            }),
        },
        TablesError::Http { status, message } => by_status(status, target, message)
            .unwrap_or_else(|message| TablesError::Http { status, message }),
        other => other,
    }
}

/// Kind implied by the status alone, for 404, 409 and 412. Other statuses
/// hand the message back.
fn by_status(status: u16, target: Target, message: String) -> Result<TablesError, String> {
    match status {
        404 => Ok(not_found(target, message)),
        409 => Ok(match target {
            Target::Entity => TablesError::EntityAlreadyExists(message),
            Target::Table => TablesError::TableAlreadyExists(message),
        }),
        412 => Ok(TablesError::PreconditionFailed(message)),
        _ => Err(message),
    }
}

fn not_found(target: Target, message: String) -> TablesError {
    match target {
        Target::Entity => TablesError::EntityNotFound(message),
        Target::Table => TablesError::TableNotFound(message),
    }
}
