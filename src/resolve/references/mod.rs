//! Property reference resolution.
//!
//! # Architecture
//! - [`classify`]: what property entity the cursor denotes, from one
//!   instrumented checking pass of the origin file
//! - [`DefinitionIdentity`]: the canonical declaration site(s) of that entity
//! - [`property`]: every access in one file that resolves back to an identity
//!
//! # Key Concepts
//! - **Override chain**: same-named member declarations from the most-derived
//!   class upwards. Two chains denote the same member iff their first entries
//!   are equal.
//! - **Object identity**: a set of declaration sites; an object literal may
//!   flow into several declared object types, and any of their sites counts.

pub mod classify;
pub mod property;

use crate::error::{Result, SleuthError};
use crate::infer::{InferenceOracle, TypeForm, TypeHandle, TypedFile, MAX_HIERARCHY_DEPTH};
use crate::symbol::{FileSet, Location};
use std::collections::BTreeSet;

/// What a checking callback observed at the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyAccessEvidence {
    /// A property read, write or call on `receiver`.
    Use {
        /// Receiver type.
        receiver: TypeHandle,
        /// Property name.
        name: String,
        /// Property token.
        location: Location,
    },
    /// A class member declaration.
    ClassMember {
        /// Instance form for members, class form for statics.
        class: TypeHandle,
        /// Member name.
        name: String,
        /// Member name token.
        location: Location,
    },
    /// An object literal or object type key.
    ObjectKey {
        /// The object the key belongs to.
        object: TypeHandle,
        /// Key name.
        name: String,
        /// Key token.
        location: Location,
        /// Declared types the literal flows into.
        flows_into: Vec<TypeHandle>,
    },
}

impl PropertyAccessEvidence {
    /// Short name of the evidence kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyAccessEvidence::Use { .. } => "use",
            PropertyAccessEvidence::ClassMember { .. } => "class member",
            PropertyAccessEvidence::ObjectKey { .. } => "object key",
        }
    }

    /// Property name.
    pub fn name(&self) -> &str {
        match self {
            PropertyAccessEvidence::Use { name, .. }
            | PropertyAccessEvidence::ClassMember { name, .. }
            | PropertyAccessEvidence::ObjectKey { name, .. } => name,
        }
    }

    /// Token the evidence was recorded at.
    pub fn location(&self) -> &Location {
        match self {
            PropertyAccessEvidence::Use { location, .. }
            | PropertyAccessEvidence::ClassMember { location, .. }
            | PropertyAccessEvidence::ObjectKey { location, .. } => location,
        }
    }
}

/// Canonical declaration site(s) of a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionIdentity {
    /// Override chain, most-derived first; never empty.
    ClassMember(Vec<Location>),
    /// Declaration sites of an object property; never empty.
    ObjectProperty(BTreeSet<Location>),
}

impl DefinitionIdentity {
    /// The entry class identities compare by (first of the chain); for
    /// object identities, the smallest site.
    pub fn first(&self) -> Option<&Location> {
        match self {
            DefinitionIdentity::ClassMember(chain) => chain.first(),
            DefinitionIdentity::ObjectProperty(sites) => sites.iter().next(),
        }
    }

    /// Every declaration site.
    pub fn locations(&self) -> Vec<Location> {
        match self {
            DefinitionIdentity::ClassMember(chain) => chain.clone(),
            DefinitionIdentity::ObjectProperty(sites) => sites.iter().cloned().collect(),
        }
    }

    /// Whether `location` is one of the declaration sites.
    pub fn is_site(&self, location: &Location) -> bool {
        match self {
            DefinitionIdentity::ClassMember(chain) => chain.contains(location),
            DefinitionIdentity::ObjectProperty(sites) => sites.contains(location),
        }
    }

    /// Files containing a declaration site.
    pub fn files(&self) -> FileSet {
        self.locations().into_iter().map(|l| l.file).collect()
    }

    /// Whether a receiver's override chain denotes this member.
    pub fn matches_chain(&self, chain: &[Location]) -> bool {
        match self {
            DefinitionIdentity::ClassMember(own) => {
                own.first().is_some() && own.first() == chain.first()
            }
            DefinitionIdentity::ObjectProperty(_) => false,
        }
    }

    /// Whether an object property declared at `site` denotes this property.
    pub fn matches_object_site(&self, site: &Location) -> bool {
        match self {
            DefinitionIdentity::ObjectProperty(sites) => sites.contains(site),
            DefinitionIdentity::ClassMember(_) => false,
        }
    }

    /// Combine two partial identities of the same entity.
    ///
    /// # Errors
    /// `IdentityShapeMismatch` for a class chain against an object set, or
    /// for two chains with different first entries.
    pub fn union(self, other: DefinitionIdentity) -> Result<DefinitionIdentity> {
        match (self, other) {
            (DefinitionIdentity::ObjectProperty(mut a), DefinitionIdentity::ObjectProperty(b)) => {
                a.extend(b);
                Ok(DefinitionIdentity::ObjectProperty(a))
            }
            (DefinitionIdentity::ClassMember(a), DefinitionIdentity::ClassMember(b)) => {
                if a.first() == b.first() {
                    Ok(if a.len() >= b.len() {
                        DefinitionIdentity::ClassMember(a)
                    } else {
                        DefinitionIdentity::ClassMember(b)
                    })
                } else {
                    Err(SleuthError::IdentityShapeMismatch(format!(
                        "different override chains: {:?} vs {:?}",
                        a.first(),
                        b.first()
                    )))
                }
            }
            (a, b) => Err(SleuthError::IdentityShapeMismatch(format!(
                "class member cannot merge with object property ({:?} vs {:?})",
                a.first(),
                b.first()
            ))),
        }
    }
}

/// Override chain of `name` on a class instance or class value.
///
/// Walks declared members upwards through superclasses, at most
/// [`MAX_HIERARCHY_DEPTH`] levels. Empty when no class in the chain declares
/// `name`.
pub fn override_chain(
    oracle: &dyn InferenceOracle,
    typed: &TypedFile,
    form: &TypeForm,
    name: &str,
) -> Result<Vec<Location>> {
    let mut chain = Vec::new();
    let mut current = Some(form.clone());
    let mut depth = 0;
    while let Some(form) = current.take() {
        if depth >= MAX_HIERARCHY_DEPTH {
            log::debug!("override chain of '{}' cut at depth {}", name, depth);
            break;
        }
        let table = oracle.extract_members(typed, &form)?;
        if let Some(Some(location)) = table.entries.get(name) {
            chain.push(location.clone());
        }
        current = table.parent;
        depth += 1;
    }
    Ok(chain)
}

/// Derive the identity a piece of evidence points at.
///
/// `Ok(None)` when the evidence does not lead to a declaration (a use on a
/// dynamic receiver, a member no class declares).
pub fn identity_of(
    oracle: &dyn InferenceOracle,
    typed: &TypedFile,
    evidence: &PropertyAccessEvidence,
) -> Result<Option<DefinitionIdentity>> {
    match evidence {
        PropertyAccessEvidence::Use { receiver, name, .. } => {
            let form = oracle.resolve_type(typed, *receiver);
            receiver_identity(oracle, typed, &form, name)
        }
        PropertyAccessEvidence::ClassMember {
            class,
            name,
            location,
        } => {
            let form = oracle.resolve_type(typed, *class);
            let mut chain = override_chain(oracle, typed, &form, name)?;
            if chain.first() != Some(location) {
                chain.insert(0, location.clone());
            }
            Ok(Some(DefinitionIdentity::ClassMember(chain)))
        }
        PropertyAccessEvidence::ObjectKey {
            name,
            location,
            flows_into,
            ..
        } => {
            let mut identity =
                DefinitionIdentity::ObjectProperty(BTreeSet::from([location.clone()]));
            for target in flows_into {
                let form = oracle.resolve_type(typed, *target);
                // Class targets keep the key's own identity.
                if !matches!(form, TypeForm::Object(_)) {
                    continue;
                }
                if let Some(partial) = receiver_identity(oracle, typed, &form, name)? {
                    identity = identity.union(partial)?;
                }
            }
            Ok(Some(identity))
        }
    }
}

/// Identity of `name` looked up on a receiver form.
fn receiver_identity(
    oracle: &dyn InferenceOracle,
    typed: &TypedFile,
    form: &TypeForm,
    name: &str,
) -> Result<Option<DefinitionIdentity>> {
    match form {
        TypeForm::Instance(_) | TypeForm::Class(_) => {
            let chain = override_chain(oracle, typed, form, name)?;
            Ok((!chain.is_empty()).then_some(DefinitionIdentity::ClassMember(chain)))
        }
        TypeForm::Object(object) => Ok(object
            .properties
            .get(name)
            .map(|p| DefinitionIdentity::ObjectProperty(BTreeSet::from([p.location.clone()])))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn loc(file: &str, start: usize) -> Location {
        Location {
            file: PathBuf::from(file),
            byte_start: start,
            byte_end: start + 1,
            line: 1,
            column: start,
        }
    }

    #[test]
    fn test_object_identities_union_as_sets() {
        let a = DefinitionIdentity::ObjectProperty(BTreeSet::from([loc("/a.ts", 1)]));
        let b =
            DefinitionIdentity::ObjectProperty(BTreeSet::from([loc("/b.ts", 2), loc("/a.ts", 1)]));
        let merged = a.union(b).unwrap();
        assert_eq!(merged.locations(), vec![loc("/a.ts", 1), loc("/b.ts", 2)]);
        assert_eq!(merged.files().len(), 2);
    }

    #[test]
    fn test_same_chain_collapses() {
        let short = DefinitionIdentity::ClassMember(vec![loc("/a.ts", 5)]);
        let long = DefinitionIdentity::ClassMember(vec![loc("/a.ts", 5), loc("/a.ts", 1)]);
        assert_eq!(short.union(long.clone()).unwrap(), long);
    }

    #[test]
    fn test_shape_mismatches_are_errors() {
        let class = DefinitionIdentity::ClassMember(vec![loc("/a.ts", 5)]);
        let other_class = DefinitionIdentity::ClassMember(vec![loc("/a.ts", 9)]);
        let object = DefinitionIdentity::ObjectProperty(BTreeSet::from([loc("/a.ts", 1)]));

        let err = class.clone().union(object).unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(matches!(
            class.union(other_class),
            Err(SleuthError::IdentityShapeMismatch(_))
        ));
    }

    #[test]
    fn test_chain_matching_uses_first_entry_only() {
        let identity = DefinitionIdentity::ClassMember(vec![loc("/a.ts", 5), loc("/a.ts", 1)]);
        assert!(identity.matches_chain(&[loc("/a.ts", 5)]));
        assert!(!identity.matches_chain(&[loc("/a.ts", 1)]));
        assert!(!identity.matches_chain(&[]));
        assert!(!identity.matches_object_site(&loc("/a.ts", 5)));
    }
}
