//! Type inference oracle.
//!
//! Reference resolution only needs a few questions answered about types:
//! what a property access's receiver is, which class or object declares a
//! member, and which object literals flow into which declared types. The
//! [`InferenceOracle`] trait is that surface. [`StructuralChecker`] answers it
//! for classes, object literals, interfaces and type aliases.
//!
//! Checking reports what it sees through a [`CheckHooks`] capability object
//! passed into [`InferenceOracle::check_file`]. Hooks are borrowed for the
//! duration of the call only; there is no registration state anywhere else.

pub mod checker;

pub use checker::StructuralChecker;

use crate::error::{Result, SleuthError};
use crate::ingest::{ParsedFile, Sources};
use crate::symbol::Location;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound on superclass walks.
pub const MAX_HIERARCHY_DEPTH: usize = 64;

/// Index of a type in a [`TypedFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHandle(pub u32);

/// Head form of a resolved type.
#[derive(Debug, Clone)]
pub enum TypeForm {
    /// Instance of a class.
    Instance(Arc<ClassInfo>),
    /// The class value itself (static side).
    Class(Arc<ClassInfo>),
    /// Object literal or declared object type.
    Object(Arc<ObjectInfo>),
    /// Callable value.
    Function(Arc<Signature>),
    /// Namespace object of a workspace module.
    Module(PathBuf),
    /// `any`, unannotated or otherwise untracked value.
    Dynamic,
    /// The type could not be determined (missing import, cycle).
    Unresolved,
    /// The checker failed on this expression.
    Failure(String),
}

impl TypeForm {
    /// Short name of the form, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TypeForm::Instance(_) => "instance",
            TypeForm::Class(_) => "class",
            TypeForm::Object(_) => "object",
            TypeForm::Function(_) => "function",
            TypeForm::Module(_) => "module",
            TypeForm::Dynamic => "dynamic",
            TypeForm::Unresolved => "unresolved",
            TypeForm::Failure(_) => "failure",
        }
    }
}

/// A class declaration.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    /// Class name (`<anonymous>` for unnamed class expressions).
    pub name: String,
    /// Location of the class name (or of the class node when unnamed).
    pub decl: Location,
    /// Instance members by name.
    pub members: BTreeMap<String, MemberDecl>,
    /// Static members by name.
    pub statics: BTreeMap<String, MemberDecl>,
    /// Constructor signature, when declared.
    pub constructor: Option<Arc<Signature>>,
    /// Resolved superclass.
    pub superclass: Option<Arc<ClassInfo>>,
}

/// Where an object type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOrigin {
    /// An object literal expression.
    Literal,
    /// An interface, type alias or inline object type.
    Declared,
}

/// An object literal or object type.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Location of the literal or type node.
    pub decl: Location,
    /// Literal or declared.
    pub origin: ObjectOrigin,
    /// Properties by name.
    pub properties: BTreeMap<String, MemberDecl>,
}

/// One declared member or property.
#[derive(Debug, Clone)]
pub struct MemberDecl {
    /// Location of the member's name token.
    pub location: Location,
    /// What the member holds.
    pub ty: MemberType,
}

/// Type information attached to a member.
#[derive(Debug, Clone)]
pub enum MemberType {
    /// Nothing known.
    Unknown,
    /// Annotated or initialised.
    Typed(TypeRef),
    /// Method with a signature.
    Method(Arc<Signature>),
}

/// An unresolved reference to a type.
#[derive(Debug, Clone)]
pub enum TypeRef {
    /// A type name; `site` is the name token, resolved through its scope.
    Named {
        /// The name as written.
        name: String,
        /// Location of the name token.
        site: Location,
    },
    /// An inline object type.
    Inline(Arc<ObjectInfo>),
    /// The value type of an expression.
    Expr(Location),
    /// An unsupported type expression.
    Dynamic,
}

/// Parameter and return types of a callable.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    /// Annotated parameter types, positionally.
    pub params: Vec<Option<TypeRef>>,
    /// Annotated return type, or the body of an expression-bodied arrow.
    pub returns: Option<TypeRef>,
}

/// Members visible on a type, plus where to look next.
#[derive(Debug, Clone, Default)]
pub struct MemberTable {
    /// Member name to declaration site.
    pub entries: BTreeMap<String, Option<Location>>,
    /// The form inherited from (superclass instance or class).
    pub parent: Option<TypeForm>,
}

/// Check-time callbacks.
///
/// Every method defaults to doing nothing, so implementors only override
/// what they collect. Locations passed in belong to the file being checked.
pub trait CheckHooks {
    /// A property of `receiver` is read, written or called.
    fn member_use(&mut self, _receiver: TypeHandle, _name: &str, _location: &Location) {}

    /// A class declares a member (`class` is the instance form for instance
    /// members and the class form for statics).
    fn class_member(&mut self, _class: TypeHandle, _name: &str, _location: &Location) {}

    /// An object literal or object type declares a key.
    fn object_key(&mut self, _object: TypeHandle, _name: &str, _location: &Location) {}

    /// An object literal flows into a declared type.
    fn object_flow(&mut self, _literal: TypeHandle, _target: TypeHandle) {}
}

/// Hooks that ignore everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl CheckHooks for NoHooks {}

/// Result of checking one file: the types handles refer to.
#[derive(Debug, Clone)]
pub struct TypedFile {
    /// The checked file.
    pub path: PathBuf,
    slots: Vec<TypeForm>,
}

impl TypedFile {
    /// Build a checked file from its interned types.
    ///
    /// `slots[i]` is the form behind `TypeHandle(i)`; every handle an oracle
    /// reports through [`CheckHooks`] must index into `slots`.
    pub fn new(path: PathBuf, slots: Vec<TypeForm>) -> Self {
        Self { path, slots }
    }

    /// Form behind a handle; dangling handles resolve to a failure.
    pub fn resolve(&self, handle: TypeHandle) -> TypeForm {
        self.slots
            .get(handle.0 as usize)
            .cloned()
            .unwrap_or_else(|| TypeForm::Failure(format!("dangling type handle {}", handle.0)))
    }

    /// Number of interned types.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no type was interned.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Questions the reference engine asks about types.
pub trait InferenceOracle: Send + Sync {
    /// Check one file, reporting through `hooks`.
    fn check_file(
        &self,
        parsed: &ParsedFile,
        sources: &Sources,
        hooks: &mut dyn CheckHooks,
    ) -> Result<TypedFile>;

    /// Head form behind a handle.
    fn resolve_type(&self, typed: &TypedFile, handle: TypeHandle) -> TypeForm {
        typed.resolve(handle)
    }

    /// Members declared directly on a form.
    ///
    /// Forms without members (functions, dynamic values) give an empty
    /// table; a failure form is an error.
    fn extract_members(&self, _typed: &TypedFile, form: &TypeForm) -> Result<MemberTable> {
        let table = match form {
            TypeForm::Instance(class) => MemberTable {
                entries: declared(&class.members),
                parent: class.superclass.clone().map(TypeForm::Instance),
            },
            TypeForm::Class(class) => MemberTable {
                entries: declared(&class.statics),
                parent: class.superclass.clone().map(TypeForm::Class),
            },
            TypeForm::Object(object) => MemberTable {
                entries: declared(&object.properties),
                parent: None,
            },
            TypeForm::Failure(message) => {
                return Err(SleuthError::Other(format!(
                    "cannot extract members: {}",
                    message
                )))
            }
            TypeForm::Function(_)
            | TypeForm::Module(_)
            | TypeForm::Dynamic
            | TypeForm::Unresolved => MemberTable::default(),
        };
        Ok(table)
    }
}

fn declared(members: &BTreeMap<String, MemberDecl>) -> BTreeMap<String, Option<Location>> {
    members
        .iter()
        .map(|(name, member)| (name.clone(), Some(member.location.clone())))
        .collect()
}
