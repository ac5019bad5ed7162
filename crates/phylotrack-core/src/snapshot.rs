//! CSV snapshots of the phylogeny.
//!
//! # Format
//!
//! One header row, then one row per taxon held in the registry, in id
//! order:
//!
//! ```text
//! id,ancestor_list,origin_time,destruction_time,num_orgs,tot_orgs,num_offspring,total_offspring,depth,info
//! 1,[NONE],0,4,0,1,2,3,0,25
//! 2,[1],6,,1,1,0,0,1,1
//! ```
//!
//! `ancestor_list` is `[NONE]` for roots and `[<parent id>]` otherwise.
//! `destruction_time` is blank while the taxon is active. Any number of
//! caller-registered columns follow the fixed ones.
//!
//! # Loading
//!
//! Only `id`, `ancestor_list` and the descriptor column are required. The
//! loader rebuilds links and depths from the ancestor lists, decides which
//! taxa are alive from `destruction_time` (blank or `inf` means alive),
//! falling back to `num_orgs` and then to leaf status when those columns
//! are missing, and hands the result to the registry in one piece. Files
//! with cycles, duplicate ids, dangling or multiple parents, or
//! unparseable numbers are rejected with a format error.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::Path;

use phylotrack_types::TaxonId;

use crate::error::SystematicsError;
use crate::registry::TaxonRegistry;
use crate::taxon::Taxon;

/// Columns written for every taxon, in order, before any custom column.
pub const SNAPSHOT_COLUMNS: [&str; 9] = [
    "id",
    "ancestor_list",
    "origin_time",
    "destruction_time",
    "num_orgs",
    "tot_orgs",
    "num_offspring",
    "total_offspring",
    "depth",
];

/// Marker written in `ancestor_list` for roots.
pub const ROOT_MARKER: &str = "[NONE]";

/// Maps a taxon to the text of one custom column.
pub type SnapshotEncoder<I> = Box<dyn Fn(&Taxon<I>) -> String + Send>;

/// Encoder that writes the taxon's descriptor with its `Display` impl.
pub fn encode_info<I: Display>(taxon: &Taxon<I>) -> String {
    taxon.info().to_string()
}

// ---------------------------------------------------------------------------
// SnapshotColumn
// ---------------------------------------------------------------------------

/// A named custom column and the encoder that fills it.
pub struct SnapshotColumn<I> {
    name: String,
    encode: SnapshotEncoder<I>,
}

impl<I> SnapshotColumn<I> {
    /// Create a custom column.
    pub fn new(name: impl Into<String>, encode: SnapshotEncoder<I>) -> Self {
        Self {
            name: name.into(),
            encode,
        }
    }

    /// Header name of the column.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encode one taxon.
    pub fn encode(&self, taxon: &Taxon<I>) -> String {
        (self.encode)(taxon)
    }
}

impl<I> core::fmt::Debug for SnapshotColumn<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SnapshotColumn")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn ancestor_list(parent: Option<TaxonId>) -> String {
    parent.map_or_else(|| ROOT_MARKER.to_owned(), |id| format!("[{id}]"))
}

/// Write every taxon in `registry` to `writer`. Returns the number of rows.
pub fn write_snapshot<I, W: std::io::Write>(
    registry: &TaxonRegistry<I>,
    columns: &[SnapshotColumn<I>],
    writer: W,
) -> Result<usize, SystematicsError> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = SNAPSHOT_COLUMNS.to_vec();
    header.extend(columns.iter().map(SnapshotColumn::name));
    csv.write_record(&header)?;

    let mut rows = 0_usize;
    for taxon in registry.iter() {
        let mut record = vec![
            taxon.id().to_string(),
            ancestor_list(taxon.parent()),
            taxon.origin_time().to_string(),
            taxon.destruction_time().map(|t| t.to_string()).unwrap_or_default(),
            taxon.num_orgs().to_string(),
            taxon.tot_orgs().to_string(),
            taxon.num_offspring().to_string(),
            taxon.total_offspring().to_string(),
            taxon.depth().to_string(),
        ];
        record.extend(columns.iter().map(|column| column.encode(taxon)));
        csv.write_record(&record)?;
        rows = rows.saturating_add(1);
    }
    csv.flush()?;
    Ok(rows)
}

/// Write a snapshot to the file at `path`, replacing it.
pub fn write_snapshot_file<I>(
    registry: &TaxonRegistry<I>,
    columns: &[SnapshotColumn<I>],
    path: &Path,
) -> Result<usize, SystematicsError> {
    let file = std::fs::File::create(path)?;
    let rows = write_snapshot(registry, columns, std::io::BufWriter::new(file))?;
    tracing::info!(path = %path.display(), rows, "snapshot written");
    Ok(rows)
}

// ---------------------------------------------------------------------------
// LoadOptions
// ---------------------------------------------------------------------------

/// How a snapshot file is turned back into a phylogeny.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Column holding the taxon descriptor.
    pub info_column: String,
    /// Renumber taxa from 1 in ascending file-id order.
    pub adjust_ids: bool,
    /// Drop extinct taxa with no living descendants instead of loading them
    /// as outside taxa.
    pub copy_retained_only: bool,
    /// Treat every leaf as alive regardless of its recorded state.
    pub assume_leaves_extant: bool,
    /// Recompute `total_offspring` from the loaded graph instead of trusting
    /// the file.
    pub recount_offspring: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            info_column: "info".to_owned(),
            adjust_ids: false,
            copy_retained_only: true,
            assume_leaves_extant: false,
            recount_offspring: false,
        }
    }
}

impl LoadOptions {
    /// Default options reading descriptors from `info_column`.
    pub fn new(info_column: impl Into<String>) -> Self {
        Self {
            info_column: info_column.into(),
            ..Self::default()
        }
    }

    /// Set [`adjust_ids`](Self::adjust_ids).
    #[must_use]
    pub const fn adjust_ids(mut self, enabled: bool) -> Self {
        self.adjust_ids = enabled;
        self
    }

    /// Set [`copy_retained_only`](Self::copy_retained_only).
    #[must_use]
    pub const fn copy_retained_only(mut self, enabled: bool) -> Self {
        self.copy_retained_only = enabled;
        self
    }

    /// Set [`assume_leaves_extant`](Self::assume_leaves_extant).
    #[must_use]
    pub const fn assume_leaves_extant(mut self, enabled: bool) -> Self {
        self.assume_leaves_extant = enabled;
        self
    }

    /// Set [`recount_offspring`](Self::recount_offspring).
    #[must_use]
    pub const fn recount_offspring(mut self, enabled: bool) -> Self {
        self.recount_offspring = enabled;
        self
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A fully linked arena ready to be handed to the registry.
#[derive(Debug)]
pub(crate) struct LoadedPhylogeny<I> {
    pub(crate) taxa: BTreeMap<TaxonId, Taxon<I>>,
    pub(crate) outside: BTreeSet<TaxonId>,
    pub(crate) next_id: TaxonId,
}

/// Column positions found in the header.
struct Layout {
    id: usize,
    ancestors: usize,
    info: usize,
    origin: Option<usize>,
    destruction: Option<usize>,
    num_orgs: Option<usize>,
    tot_orgs: Option<usize>,
    total_offspring: Option<usize>,
}

impl Layout {
    fn from_header(header: &csv::StringRecord, info_column: &str) -> Result<Self, SystematicsError> {
        let find = |name: &str| header.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| SystematicsError::Format {
                reason: format!("missing required column `{name}`"),
            })
        };
        Ok(Self {
            id: require("id")?,
            ancestors: require("ancestor_list")?,
            info: require(info_column)?,
            origin: find("origin_time"),
            destruction: find("destruction_time"),
            num_orgs: find("num_orgs"),
            tot_orgs: find("tot_orgs"),
            total_offspring: find("total_offspring"),
        })
    }
}

/// One parsed data row.
struct Row<I> {
    parent: Option<u64>,
    info: Option<I>,
    origin: u64,
    /// `None` when the column is absent, `Some(None)` for blank or `inf`.
    destruction: Option<Option<u64>>,
    num_orgs: Option<u64>,
    tot_orgs: Option<u64>,
    total_offspring: u64,
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize, line: Option<u64>) -> Result<&'r str, SystematicsError> {
    record
        .get(idx)
        .ok_or_else(|| SystematicsError::format_at(line, format!("missing field {idx}")))
}

fn parse_number(text: &str, column: &str, line: Option<u64>) -> Result<u64, SystematicsError> {
    let text = text.trim();
    text.parse::<u64>()
        .map_err(|err| SystematicsError::format_at(line, format!("invalid {column} `{text}`: {err}")))
}

fn optional_number(
    record: &csv::StringRecord,
    idx: Option<usize>,
    column: &str,
    line: Option<u64>,
) -> Result<Option<u64>, SystematicsError> {
    let Some(idx) = idx else {
        return Ok(None);
    };
    let text = field(record, idx, line)?.trim();
    if text.is_empty() {
        return Ok(None);
    }
    parse_number(text, column, line).map(Some)
}

fn parse_ancestor_list(text: &str, line: Option<u64>) -> Result<Option<u64>, SystematicsError> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']').trim();
    if inner.is_empty() || inner.eq_ignore_ascii_case("NONE") {
        return Ok(None);
    }
    let parents: Vec<&str> = inner
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    match parents.as_slice() {
        [] => Ok(None),
        [single] => parse_number(single, "ancestor_list", line).map(Some),
        _ => Err(SystematicsError::format_at(
            line,
            format!("taxa with multiple parents are not supported: `{text}`"),
        )),
    }
}

fn parse_destruction(text: &str, line: Option<u64>) -> Result<Option<u64>, SystematicsError> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("inf") {
        return Ok(None);
    }
    parse_number(text, "destruction_time", line).map(Some)
}

/// Parse a snapshot from `reader`, decoding descriptors with `decode`.
pub(crate) fn read_snapshot<I, R, F>(
    reader: R,
    options: &LoadOptions,
    mut decode: F,
) -> Result<LoadedPhylogeny<I>, SystematicsError>
where
    R: std::io::Read,
    F: FnMut(&str) -> Result<I, String>,
{
    // Descriptor cells are taken verbatim; numeric cells are trimmed where parsed.
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::None).from_reader(reader);
    let layout = Layout::from_header(csv.headers()?, &options.info_column)?;

    let mut rows: BTreeMap<u64, Row<I>> = BTreeMap::new();
    for record in csv.records() {
        let record = record?;
        let line = record.position().map(csv::Position::line);
        let id = parse_number(field(&record, layout.id, line)?, "id", line)?;
        let info_text = field(&record, layout.info, line)?;
        let info = decode(info_text).map_err(|err| {
            SystematicsError::format_at(line, format!("cannot decode `{}` value `{info_text}`: {err}", options.info_column))
        })?;
        let destruction = match layout.destruction {
            Some(idx) => Some(parse_destruction(field(&record, idx, line)?, line)?),
            None => None,
        };
        let num_orgs = optional_number(&record, layout.num_orgs, "num_orgs", line)?;
        let row = Row {
            parent: parse_ancestor_list(field(&record, layout.ancestors, line)?, line)?,
            info: Some(info),
            origin: optional_number(&record, layout.origin, "origin_time", line)?.unwrap_or(0),
            destruction,
            num_orgs,
            tot_orgs: optional_number(&record, layout.tot_orgs, "tot_orgs", line)?,
            total_offspring: optional_number(&record, layout.total_offspring, "total_offspring", line)?
                .unwrap_or(0),
        };
        if rows.insert(id, row).is_some() {
            return Err(SystematicsError::format_at(line, format!("duplicate taxon id {id}")));
        }
    }

    build(rows, &layout, options)
}

/// Link parsed rows into taxa.
fn build<I>(
    mut rows: BTreeMap<u64, Row<I>>,
    layout: &Layout,
    options: &LoadOptions,
) -> Result<LoadedPhylogeny<I>, SystematicsError> {
    let mut children: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
    let mut roots = Vec::new();
    for (&id, row) in &rows {
        match row.parent {
            Some(parent) if !rows.contains_key(&parent) => {
                return Err(SystematicsError::Format {
                    reason: format!("taxon {id} names unknown parent {parent}"),
                });
            }
            Some(parent) => {
                children.entry(parent).or_default().insert(id);
            }
            None => roots.push(id),
        }
    }

    // Pre-order walk from the roots; anything not reached sits on a cycle.
    let mut depth: BTreeMap<u64, u32> = BTreeMap::new();
    let mut order = Vec::with_capacity(rows.len());
    let mut stack: Vec<(u64, u32)> = roots.iter().map(|&id| (id, 0)).collect();
    while let Some((id, d)) = stack.pop() {
        depth.insert(id, d);
        order.push(id);
        for &child in children.get(&id).into_iter().flatten() {
            stack.push((child, d.saturating_add(1)));
        }
    }
    if let Some(id) = rows.keys().find(|id| !depth.contains_key(id)) {
        return Err(SystematicsError::Format {
            reason: format!("taxon {id} is not reachable from any root (ancestor cycle)"),
        });
    }

    let is_leaf = |id: u64| children.get(&id).is_none_or(BTreeSet::is_empty);
    let alive: BTreeSet<u64> = rows
        .iter()
        .filter(|&(&id, row)| {
            let recorded = match (row.destruction, layout.num_orgs) {
                (Some(destruction), _) => destruction.is_none(),
                (None, Some(_)) => row.num_orgs.unwrap_or(0) > 0,
                (None, None) => is_leaf(id),
            };
            recorded || (options.assume_leaves_extant && is_leaf(id))
        })
        .map(|(&id, _)| id)
        .collect();

    // Post-order: living descendants and subtree sizes.
    let mut living: BTreeSet<u64> = BTreeSet::new();
    let mut subtree: BTreeMap<u64, u64> = BTreeMap::new();
    for &id in order.iter().rev() {
        let kids = children.get(&id);
        let has_living = alive.contains(&id) || kids.into_iter().flatten().any(|c| living.contains(c));
        if has_living {
            living.insert(id);
        }
        let below = kids
            .into_iter()
            .flatten()
            .map(|c| subtree.get(c).copied().unwrap_or(0).saturating_add(1))
            .fold(0_u64, u64::saturating_add);
        subtree.insert(id, below);
    }

    let dead_ends: BTreeSet<u64> = rows.keys().copied().filter(|id| !living.contains(id)).collect();
    if options.copy_retained_only {
        rows.retain(|id, _| !dead_ends.contains(id));
    }

    let remap: BTreeMap<u64, TaxonId> = if options.adjust_ids {
        rows.keys()
            .zip(1_u64..)
            .map(|(&old, new)| (old, TaxonId(new)))
            .collect()
    } else {
        rows.keys().map(|&id| (id, TaxonId(id))).collect()
    };
    let next_id = remap.values().max().map_or(TaxonId::FIRST, |max| max.next());
    let map = |old: u64| remap.get(&old).copied().unwrap_or(TaxonId(old));

    let mut taxa = BTreeMap::new();
    let mut outside = BTreeSet::new();
    for (id, row) in &mut rows {
        let new_id = map(*id);
        let Some(info) = row.info.take() else {
            continue;
        };
        let is_alive = alive.contains(id);
        let num_orgs = if is_alive { row.num_orgs.unwrap_or(1).max(1) } else { 0 };
        let tot_orgs = row.tot_orgs.unwrap_or(num_orgs).max(num_orgs);
        let total_offspring = if options.recount_offspring {
            subtree.get(id).copied().unwrap_or(0)
        } else {
            row.total_offspring
        };

        let mut taxon = Taxon::with_lineage(
            new_id,
            info,
            row.parent.map(map),
            depth.get(id).copied().unwrap_or(0),
            row.origin,
        );
        taxon.restore_counts(num_orgs, tot_orgs, total_offspring, row.origin);
        if !is_alive {
            let recorded = row.destruction.flatten();
            taxon.set_destruction_time(Some(recorded.unwrap_or(row.origin)));
        }
        for &child in children.get(id).into_iter().flatten() {
            if living.contains(&child) {
                taxon.add_child(map(child));
            }
        }
        if dead_ends.contains(id) {
            outside.insert(new_id);
        }
        taxa.insert(new_id, taxon);
    }

    Ok(LoadedPhylogeny { taxa, outside, next_id })
}

/// Load `path` into `registry`, replacing its contents. Returns the number
/// of taxa loaded.
pub(crate) fn load_into<I, F>(
    registry: &mut TaxonRegistry<I>,
    path: &Path,
    options: &LoadOptions,
    decode: F,
) -> Result<usize, SystematicsError>
where
    F: FnMut(&str) -> Result<I, String>,
{
    let file = std::fs::File::open(path)?;
    let loaded = read_snapshot(std::io::BufReader::new(file), options, decode)?;
    let count = loaded.taxa.len();
    registry.restore(loaded.taxa, loaded.outside, loaded.next_id);
    tracing::info!(
        path = %path.display(),
        taxa = count,
        active = registry.num_active(),
        ancestors = registry.num_ancestors(),
        outside = registry.num_outside(),
        "snapshot loaded"
    );
    Ok(count)
}
