//! Declaration-kind classification of a cursor that is not on a lexical
//! identifier.
//!
//! The origin file is checked once with [`ClassifierHooks`]. The hooks only
//! keep callbacks whose location covers the cursor, and only the last of
//! those. They live on this function's stack and are lent to the checker for
//! the duration of the call, so nothing stays registered once it returns.

use super::PropertyAccessEvidence;
use crate::error::{Result, SleuthError};
use crate::infer::{CheckHooks, InferenceOracle, TypeForm, TypeHandle, TypedFile};
use crate::ingest::{ParsedFile, Sources};
use crate::symbol::{Cursor, Location};

/// Evidence at the cursor together with the checked file it refers into.
#[derive(Debug, Clone)]
pub struct Classification {
    /// The winning evidence.
    pub evidence: PropertyAccessEvidence,
    /// Types behind the evidence's handles.
    pub typed: TypedFile,
}

struct ClassifierHooks<'c> {
    cursor: &'c Cursor,
    winner: Option<PropertyAccessEvidence>,
    mismatch: Option<(&'static str, &'static str)>,
    flows: Vec<(TypeHandle, TypeHandle)>,
}

impl<'c> ClassifierHooks<'c> {
    fn new(cursor: &'c Cursor) -> Self {
        Self {
            cursor,
            winner: None,
            mismatch: None,
            flows: Vec::new(),
        }
    }

    fn record(&mut self, evidence: PropertyAccessEvidence) {
        if !evidence.location().contains(self.cursor) {
            return;
        }
        if let Some(previous) = &self.winner {
            if previous.kind() != evidence.kind() && self.mismatch.is_none() {
                self.mismatch = Some((previous.kind(), evidence.kind()));
            }
        }
        self.winner = Some(evidence);
    }
}

impl CheckHooks for ClassifierHooks<'_> {
    fn member_use(&mut self, receiver: TypeHandle, name: &str, location: &Location) {
        self.record(PropertyAccessEvidence::Use {
            receiver,
            name: name.to_string(),
            location: location.clone(),
        });
    }

    fn class_member(&mut self, class: TypeHandle, name: &str, location: &Location) {
        self.record(PropertyAccessEvidence::ClassMember {
            class,
            name: name.to_string(),
            location: location.clone(),
        });
    }

    fn object_key(&mut self, object: TypeHandle, name: &str, location: &Location) {
        self.record(PropertyAccessEvidence::ObjectKey {
            object,
            name: name.to_string(),
            location: location.clone(),
            flows_into: Vec::new(),
        });
    }

    fn object_flow(&mut self, literal: TypeHandle, target: TypeHandle) {
        self.flows.push((literal, target));
    }
}

/// Classify the property entity under `cursor`.
///
/// `Ok(None)` when no property use or declaration covers the cursor.
///
/// # Errors
/// Checker failures, and `MismatchedEvidenceKinds` when two different kinds
/// of evidence were recorded at the cursor.
pub fn classify(
    parsed: &ParsedFile,
    oracle: &dyn InferenceOracle,
    sources: &Sources,
    cursor: &Cursor,
) -> Result<Option<Classification>> {
    let mut hooks = ClassifierHooks::new(cursor);
    let typed = oracle.check_file(parsed, sources, &mut hooks)?;

    let ClassifierHooks {
        winner,
        mismatch,
        flows,
        ..
    } = hooks;

    if let Some((first, second)) = mismatch {
        return Err(SleuthError::MismatchedEvidenceKinds {
            file: cursor.file.clone(),
            offset: cursor.offset,
            first,
            second,
        });
    }

    let Some(mut evidence) = winner else {
        log::debug!("no property evidence at {}:{}", cursor.file.display(), cursor.offset);
        return Ok(None);
    };

    if let PropertyAccessEvidence::ObjectKey {
        object, flows_into, ..
    } = &mut evidence
    {
        *flows_into = flows_from(oracle, &typed, *object, &flows);
    }

    log::debug!(
        "classified '{}' at {} as {}",
        evidence.name(),
        evidence.location(),
        evidence.kind()
    );
    Ok(Some(Classification { evidence, typed }))
}

/// Targets of every flow whose literal is the object behind `object`.
fn flows_from(
    oracle: &dyn InferenceOracle,
    typed: &TypedFile,
    object: TypeHandle,
    flows: &[(TypeHandle, TypeHandle)],
) -> Vec<TypeHandle> {
    let TypeForm::Object(origin) = oracle.resolve_type(typed, object) else {
        return Vec::new();
    };
    flows
        .iter()
        .filter(|(literal, _)| match oracle.resolve_type(typed, *literal) {
            TypeForm::Object(literal) => literal.decl == origin.decl,
            _ => false,
        })
        .map(|(_, target)| *target)
        .collect()
}
