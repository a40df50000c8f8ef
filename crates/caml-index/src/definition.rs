//
// definition.rs
//
// Symbol tree built from interface files
//

use std::fmt;

/// Kind of a definition node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    /// A module, one per interface file, nested `module M : sig .. end`, or
    /// the synthetic aggregation root
    Module,
    /// `module type S = sig .. end`
    ModuleType,
    /// `val name : t`
    Value,
    /// `external name : t = "prim"`
    External,
    /// `type t = ..`
    Type,
    /// Variant constructor of a type
    Constructor,
    /// Record field of a type
    RecordField,
    /// `exception E of ..`
    Exception,
    /// `class c : .. object .. end`
    Class,
    /// `class type c = object .. end`
    ClassType,
    /// Method declared in a class or class type
    Method,
}

impl DefinitionKind {
    /// Whether definitions of this kind can hold nested items worth recursing into
    pub fn is_container(self) -> bool {
        matches!(
            self,
            DefinitionKind::Module
                | DefinitionKind::ModuleType
                | DefinitionKind::Class
                | DefinitionKind::ClassType
        )
    }

    /// Short keyword used when rendering the tree
    pub fn label(self) -> &'static str {
        match self {
            DefinitionKind::Module => "module",
            DefinitionKind::ModuleType => "module type",
            DefinitionKind::Value => "val",
            DefinitionKind::External => "external",
            DefinitionKind::Type => "type",
            DefinitionKind::Constructor => "constructor",
            DefinitionKind::RecordField => "field",
            DefinitionKind::Exception => "exception",
            DefinitionKind::Class => "class",
            DefinitionKind::ClassType => "class type",
            DefinitionKind::Method => "method",
        }
    }
}

/// A node in the symbol tree.
///
/// Children are owned exclusively by their parent. Trees are append-only while
/// a build is in progress and treated as immutable once handed to readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    kind: DefinitionKind,
    name: String,
    children: Vec<Definition>,
    /// One-line rendering of the declared type, if any
    pub signature: Option<String>,
    /// Documentation comment attached to the item
    pub doc: Option<String>,
    /// 0-based line of the item in its file
    pub line: Option<u32>,
}

impl Definition {
    pub fn new(kind: DefinitionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            children: Vec::new(),
            signature: None,
            doc: None,
            line: None,
        }
    }

    /// Synthetic root that aggregates every module visible to a build
    pub fn aggregation_root() -> Self {
        Self::new(DefinitionKind::Module, "")
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        let signature = signature.into();
        if !signature.is_empty() {
            self.signature = Some(signature);
        }
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn kind(&self) -> DefinitionKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_child(&mut self, child: Definition) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[Definition] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// First direct child with the given name and kind
    pub fn find(&self, name: &str, kind: DefinitionKind) -> Option<&Definition> {
        self.children
            .iter()
            .find(|child| child.kind == kind && child.name == name)
    }

    /// First direct child with the given name, whatever its kind
    pub fn find_any(&self, name: &str) -> Option<&Definition> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Follow a qualified path such as `["List", "map"]`.
    ///
    /// Intermediate segments only match container kinds (modules, module
    /// types, classes); the last segment matches any kind. First match wins at
    /// every level.
    pub fn find_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Definition> {
        let (last, prefix) = path.split_last()?;
        let mut current = self;
        for segment in prefix {
            current = current
                .children
                .iter()
                .find(|c| c.kind.is_container() && c.name == segment.as_ref())?;
        }
        current.find_any(last.as_ref())
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{} {}", "", self.kind.label(), self.name, indent = depth * 2)?;
        if let Some(sig) = &self.signature {
            write!(f, " : {}", sig)?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            // Aggregation root: render children at top level
            for child in &self.children {
                child.fmt_indented(f, 0)?;
            }
            Ok(())
        } else {
            self.fmt_indented(f, 0)
        }
    }
}

/// Derive a module name from a file name: first character upper-cased,
/// extension removed (`list.mli` becomes `List`).
pub fn module_name_from_file(file_name: &str) -> String {
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
