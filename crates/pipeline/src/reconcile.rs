use offload_card::{Catalog, FileKind, FileRecord};
use offload_state::ProcessedRecord;
use std::collections::BTreeMap;

/// What a run has to do, worked out from the card and the remembered state.
#[derive(Debug)]
pub struct Reconciliation<'a> {
    /// Files of the requested kind not yet processed, in discovery order and
    /// cut to the limit.
    pub new_files: Vec<&'a FileRecord>,
    /// Remembered filenames no longer on the card, of any kind.
    pub forget: Vec<String>,
    /// New files left for a later run because of the limit.
    pub deferred: usize,
}

/// A file is new iff its name is absent from `processed`. `limit` keeps a
/// prefix of the new files and has no effect on `forget`.
pub fn reconcile<'a>(
    catalog: &'a Catalog,
    kind: FileKind,
    processed: &BTreeMap<String, ProcessedRecord>,
    limit: Option<usize>,
) -> Reconciliation<'a> {
    let names = catalog.names();
    let forget = processed.keys().filter(|name| !names.contains(name.as_str())).cloned().collect();

    let mut new_files: Vec<_> = catalog.files(kind).iter().filter(|f| !processed.contains_key(&f.name)).collect();
    let mut deferred = 0;
    if let Some(limit) = limit
        && new_files.len() > limit
    {
        deferred = new_files.len() - limit;
        new_files.truncate(limit);
    }
    Reconciliation { new_files, forget, deferred }
}
