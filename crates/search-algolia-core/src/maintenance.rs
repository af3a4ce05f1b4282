//! Best-effort index maintenance.
//!
//! Every operation here is fire-and-forget: failures are logged at `warn`
//! and reported as `false`, never raised, and never retried.

use tracing::{debug, warn};

use crate::document::EngineDocument;
use crate::filter::{Clause, Term};
use crate::highlight::HighlightMarkers;
use crate::index::{IndexError, IndexSettings, SearchIndex, TaskId};
use crate::models::{FieldMap, FileIndexStatus, StoredFile};

fn upsert<I>(index: &I, object: &FieldMap, wait: bool) -> Result<TaskId, IndexError>
where
    I: SearchIndex + ?Sized,
{
    let id = object
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| IndexError::Decode("exported record has no id".to_string()))?;
    let task = index.add_object(object, id)?;
    if wait {
        index.wait_task(task)?;
    }
    Ok(task)
}

/// Export `doc` and upsert it under its id, optionally waiting for the
/// indexing task to complete.
pub fn add_document<I, D>(index: &I, doc: &D, wait: bool) -> bool
where
    I: SearchIndex + ?Sized,
    D: EngineDocument + ?Sized,
{
    match upsert(index, &doc.export_for_engine(), wait) {
        Ok(task) => {
            debug!("Indexed {} (task {})", doc.engine_id(), task);
            true
        }
        Err(e) => {
            warn!("Failed to add document {}: {}", doc.engine_id(), e);
            false
        }
    }
}

/// Upsert the sub-record for `file` attached to `doc`.
pub fn add_file_document<I, D>(
    index: &I,
    doc: &D,
    file: &StoredFile,
    status: FileIndexStatus,
    wait: bool,
) -> bool
where
    I: SearchIndex + ?Sized,
    D: EngineDocument + ?Sized,
{
    match upsert(index, &doc.export_file_for_engine(file, status), wait) {
        Ok(_) => true,
        Err(e) => {
            warn!(
                "Failed to add file {} of document {}: {}",
                file.id,
                doc.engine_id(),
                e
            );
            false
        }
    }
}

pub fn delete_by_id<I: SearchIndex + ?Sized>(index: &I, id: &str) -> bool {
    match index.delete_object(id) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to delete {}: {}", id, e);
            false
        }
    }
}

/// Delete every record of `area_id`, or every record when `None`.
pub fn delete_area<I: SearchIndex + ?Sized>(index: &I, area_id: Option<&str>) -> bool {
    let filter = area_id.map(|id| Clause::single(Term::StrEq("areaid", id.to_string())).to_string());
    match index.delete_by_query(filter.as_deref()) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to delete records of {}: {}", area_id.unwrap_or("all areas"), e);
            false
        }
    }
}

/// Drop index `name`, or every index of the application when `None`.
///
/// Returns false if any deletion failed; the rest are still attempted.
pub fn clear_indices<I: SearchIndex + ?Sized>(index: &I, name: Option<&str>) -> bool {
    let names = match name {
        Some(name) => vec![name.to_string()],
        None => match index.list_indexes() {
            Ok(names) => names,
            Err(e) => {
                warn!("Failed to list indexes: {}", e);
                return false;
            }
        },
    };

    let mut ok = true;
    for name in &names {
        if let Err(e) = index.delete_index(name) {
            warn!("Failed to delete index {}: {}", name, e);
            ok = false;
        }
    }
    ok
}

/// Push the document index settings.
pub fn apply_settings<I: SearchIndex + ?Sized>(index: &I, markers: &HighlightMarkers) -> bool {
    match index.set_settings(&IndexSettings::for_documents(markers)) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to apply index settings: {}", e);
            false
        }
    }
}
