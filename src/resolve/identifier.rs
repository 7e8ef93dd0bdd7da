//! Cursor → lexical binding → same-file use-set.

use crate::error::{Result, SleuthError};
use crate::ingest::scope::BindingId;
use crate::ingest::{parse_source, ParsedFile};
use crate::symbol::{sort_dedup, Cursor, Location};
use std::path::Path;

/// What the cursor resolved through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOrigin {
    /// An identifier occurrence of a scope binding.
    Binding(BindingId),
    /// An export-name token that is not an identifier occurrence
    /// (`exports.foo`, `export { a as foo }`).
    ExportToken,
}

/// A resolved identifier and its uses in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierMatch {
    /// Binding name, or exported name for export tokens.
    pub name: String,
    /// Every use, declaration included, sorted.
    pub locations: Vec<Location>,
    /// How the match was found.
    pub origin: MatchOrigin,
}

/// Parse `source` and resolve the identifier under `cursor`.
///
/// # Errors
/// Parse errors, and `AmbiguousMatch` when several occurrences cover the
/// cursor.
pub fn resolve(file: &Path, source: &str, cursor: &Cursor) -> Result<Option<IdentifierMatch>> {
    let parsed = parse_source(file, source)?;
    resolve_in(&parsed, cursor)
}

/// Resolve the identifier under `cursor` in an already parsed file.
///
/// `Ok(None)` means the cursor is not on a lexical identifier nor on an
/// export-name token; the caller falls back to property resolution.
pub fn resolve_in(parsed: &ParsedFile, cursor: &Cursor) -> Result<Option<IdentifierMatch>> {
    let hits = parsed.scopes.occurrences_at(cursor);
    match hits.as_slice() {
        [] => Ok(export_token_at(parsed, cursor)),
        [occurrence] => {
            let binding = parsed.scopes.binding(occurrence.binding);
            let locations = parsed.scopes.uses_of(occurrence.binding);
            log::debug!(
                "{} resolved to binding '{}' ({} uses)",
                occurrence.location,
                binding.name,
                locations.len()
            );
            Ok(Some(IdentifierMatch {
                name: binding.name.clone(),
                locations: sort_dedup(locations),
                origin: MatchOrigin::Binding(occurrence.binding),
            }))
        }
        many => Err(SleuthError::AmbiguousMatch {
            file: cursor.file.clone(),
            offset: cursor.offset,
            candidates: many
                .iter()
                .map(|o| parsed.scopes.binding(o.binding).name.clone())
                .collect(),
        }),
    }
}

fn export_token_at(parsed: &ParsedFile, cursor: &Cursor) -> Option<IdentifierMatch> {
    let pseudo_uses = &parsed.signature.pseudo_uses;
    let (name, _) = pseudo_uses.iter().find(|(_, loc)| loc.contains(cursor))?;
    let locations = pseudo_uses
        .iter()
        .filter(|(n, _)| n == name)
        .map(|(_, loc)| loc.clone())
        .collect();
    Some(IdentifierMatch {
        name: name.clone(),
        locations: sort_dedup(locations),
        origin: MatchOrigin::ExportToken,
    })
}
