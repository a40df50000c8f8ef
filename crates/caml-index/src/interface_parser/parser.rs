//
// interface_parser/parser.rs
//
// Signature extraction from the tree-sitter OCaml interface grammar
//
// Only the shape of a signature is recovered: item names, nesting and a
// one-line rendering of each type. Type expressions are taken verbatim from
// the source with whitespace collapsed.
//

use tree_sitter::Node;

use super::parser_pool::{non_extra_children, with_parser};
use crate::definition::{Definition, DefinitionKind};
use crate::error::ParseError;

/// Node kinds that never contribute to a rendered signature
const IGNORED_KINDS: &[&str] = &["comment", "attribute", "item_attribute", "extension"];

/// Parse interface source text into a module named `module_name`.
///
/// Any `ERROR` or `MISSING` node in the tree rejects the whole file.
pub fn parse_signature(src: &str, module_name: &str) -> Result<Definition, ParseError> {
    let tree = with_parser(|parser| parser.parse(src, None)).ok_or(ParseError::NoTree)?;
    let root = tree.root_node();
    if root.has_error() {
        let node = first_problem(root).unwrap_or(root);
        return Err(problem_error(node, src));
    }

    let walker = SignatureWalker { src };
    let mut module = Definition::new(DefinitionKind::Module, module_name);
    for item in walker.signature_items(root) {
        module.add_child(item);
    }
    Ok(module)
}

/// Depth-first search for the first error or missing node
fn first_problem(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_problem);
    found
}

fn problem_error(node: Node<'_>, src: &str) -> ParseError {
    let line = row(node);
    if node.is_missing() {
        return ParseError::Missing {
            line,
            expected: node.kind().to_string(),
        };
    }
    let found: String = collapse(src.get(node.byte_range()).unwrap_or_default())
        .chars()
        .take(40)
        .collect();
    ParseError::Syntax { line, found }
}

fn row(node: Node<'_>) -> u32 {
    node.start_position().row as u32
}

fn end_row(node: Node<'_>) -> u32 {
    node.end_position().row as u32
}

/// Collapse all whitespace runs to single spaces
fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Body of a `(** .. *)` comment. Plain comments, `(**)` and `(*** ..`
/// banners are not documentation.
fn doc_text(comment: &str) -> Option<String> {
    let body = comment.strip_prefix("(**")?;
    if body.starts_with('*') || body == ")" {
        return None;
    }
    let body = body.strip_suffix("*)").unwrap_or(body);
    Some(body.trim().to_string())
}

/// One entry of a container: the definitions an item produced, or a doc
/// comment waiting to be attached
enum Entry {
    Item {
        defs: Vec<Definition>,
        start: u32,
        end: u32,
    },
    Doc {
        text: String,
        start: u32,
        end: u32,
    },
}

impl Entry {
    fn start(&self) -> u32 {
        match self {
            Entry::Item { start, .. } | Entry::Doc { start, .. } => *start,
        }
    }
}

/// Attach doc comments to definitions.
///
/// A doc comment documents the next item, unless it follows an item on the
/// same line. With `next_line` set, a doc comment on the line after an item
/// and separated from what follows by a blank line also documents that item
/// (the standard library's layout).
fn attach_docs(entries: Vec<Entry>, next_line: bool) -> Vec<Definition> {
    let mut out: Vec<Definition> = Vec::new();
    let mut pending: Option<String> = None;
    let mut last: Option<(usize, u32)> = None;
    let mut entries = entries.into_iter().peekable();

    while let Some(entry) = entries.next() {
        match entry {
            Entry::Doc { text, start, end } => {
                let next_start = entries.peek().map(Entry::start);
                let attach_to = last.filter(|&(idx, prev_end)| {
                    out[idx].doc.is_none()
                        && pending.is_none()
                        && (start == prev_end
                            || (next_line
                                && start == prev_end + 1
                                && next_start.map_or(true, |n| n > end + 1)))
                });
                match attach_to {
                    Some((idx, _)) => out[idx].doc = Some(text),
                    None => pending = Some(text),
                }
            }
            Entry::Item { defs, end, .. } => {
                let doc = pending.take();
                if defs.is_empty() {
                    last = None;
                    continue;
                }
                let first = out.len();
                out.extend(defs);
                if let Some(doc) = doc {
                    if out[first].doc.is_none() {
                        out[first].doc = Some(doc);
                    }
                }
                last = Some((out.len() - 1, end));
            }
        }
    }
    out
}

struct SignatureWalker<'s> {
    src: &'s str,
}

impl<'s> SignatureWalker<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        self.src.get(node.byte_range()).unwrap_or_default()
    }

    /// Walk the children of `node`, turning each named child into
    /// definitions with `item` and attaching doc comments found among them.
    fn members(
        &self,
        node: Node<'_>,
        next_line: bool,
        item: &dyn Fn(Node<'_>) -> Vec<Definition>,
    ) -> Vec<Definition> {
        let mut entries = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "comment" {
                self.push_doc(&mut entries, child);
                continue;
            }
            if !child.is_named() || child.is_extra() {
                continue;
            }
            entries.push(Entry::Item {
                defs: item(child),
                start: row(child),
                end: end_row(child),
            });
            // Comments after the last token of an item can end up inside it.
            // Type definitions handle their own comments.
            if child.kind() != "type_definition" {
                self.push_trailing_docs(&mut entries, child);
            }
        }
        attach_docs(entries, next_line)
    }

    fn push_doc(&self, entries: &mut Vec<Entry>, comment: Node<'_>) {
        if let Some(text) = doc_text(self.text(comment)) {
            entries.push(Entry::Doc {
                text,
                start: row(comment),
                end: end_row(comment),
            });
        }
    }

    fn push_trailing_docs(&self, entries: &mut Vec<Entry>, item: Node<'_>) {
        let mut cursor = item.walk();
        let children: Vec<Node<'_>> = item.children(&mut cursor).collect();
        let after_last_token = children
            .iter()
            .rposition(|c| !c.is_extra())
            .map_or(0, |i| i + 1);
        for comment in children[after_last_token..]
            .iter()
            .filter(|c| c.kind() == "comment")
        {
            self.push_doc(entries, *comment);
        }
    }

    /// Items of a compilation unit or a `sig .. end` body
    fn signature_items(&self, node: Node<'_>) -> Vec<Definition> {
        self.members(node, true, &|child| self.item(child))
    }

    fn item(&self, node: Node<'_>) -> Vec<Definition> {
        match node.kind() {
            "value_specification" => self.value(node, DefinitionKind::Value).into_iter().collect(),
            "external" => self.value(node, DefinitionKind::External).into_iter().collect(),
            "type_definition" => self.members(node, false, &|child| {
                if child.kind() == "type_binding" {
                    self.type_binding(child).into_iter().collect()
                } else {
                    Vec::new()
                }
            }),
            "exception_definition" => self
                .child_of_kind(node, &["constructor_declaration"])
                .and_then(|ctor| self.constructor(ctor, DefinitionKind::Exception))
                .into_iter()
                .collect(),
            "module_definition" => self.bindings(node, "module_binding", |b| self.module_binding(b)),
            "module_type_definition" => self.module_type_definition(node).into_iter().collect(),
            "class_definition" | "class_specification" => {
                self.bindings(node, "class_binding", |b| self.class_binding(b, DefinitionKind::Class))
            }
            "class_type_definition" => self.bindings(node, "class_type_binding", |b| {
                self.class_binding(b, DefinitionKind::ClassType)
            }),
            // open, include, floating attributes and extensions
            other => {
                log::trace!("Skipping signature item `{}`", other);
                Vec::new()
            }
        }
    }

    fn bindings<F>(&self, node: Node<'_>, kind: &str, binding: F) -> Vec<Definition>
    where
        F: Fn(Node<'_>) -> Option<Definition>,
    {
        let mut cursor = node.walk();
        let defs = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == kind)
            .filter_map(binding)
            .collect();
        defs
    }

    fn child_of_kind<'t>(&self, node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
        let mut cursor = node.walk();
        let found = node
            .named_children(&mut cursor)
            .find(|c| kinds.contains(&c.kind()));
        found
    }

    /// Source text of the children following the first token in `starts`,
    /// up to (not including) the first token in `stops`, on one line.
    /// Comments and attributes are left out.
    fn text_after(&self, node: Node<'_>, starts: &[&str], stops: &[&str]) -> Option<String> {
        let mut cursor = node.walk();
        let children = non_extra_children(node, &mut cursor);
        let begin = children
            .iter()
            .position(|c| !c.is_named() && starts.contains(&c.kind()))?;
        let body: Vec<Node<'_>> = children[begin + 1..]
            .iter()
            .copied()
            .take_while(|c| c.is_named() || !stops.contains(&c.kind()))
            .filter(|c| !IGNORED_KINDS.contains(&c.kind()))
            .collect();
        let (first, last) = (body.first()?, body.last()?);
        let text = self.src.get(first.start_byte()..last.end_byte())?;
        Some(collapse(text))
    }

    /// `val name : t` or `external name : t = "prim"`
    fn value(&self, node: Node<'_>, kind: DefinitionKind) -> Option<Definition> {
        let name_node = self.child_of_kind(node, &["value_name", "parenthesized_operator"])?;
        let name = match name_node.kind() {
            "parenthesized_operator" => operator_name(self.text(name_node)),
            _ => self.text(name_node).to_string(),
        };
        let signature = self.text_after(node, &[":"], &["="]).unwrap_or_default();
        Some(
            Definition::new(kind, name)
                .with_signature(signature)
                .with_line(row(name_node)),
        )
    }

    /// One binding of a `type` item: variants and record fields become
    /// children, a manifest becomes the signature.
    fn type_binding(&self, node: Node<'_>) -> Option<Definition> {
        let mut def: Option<Definition> = None;
        let mut after_equals = false;
        let mut cursor = node.walk();

        for child in non_extra_children(node, &mut cursor) {
            if def.is_none() {
                let name = match child.kind() {
                    "type_constructor" => Some(child),
                    // `type M.t += ..`
                    "type_constructor_path" => child.named_child(child.named_child_count().saturating_sub(1)),
                    _ => None,
                };
                if let Some(name) = name {
                    def = Some(
                        Definition::new(DefinitionKind::Type, self.text(name)).with_line(row(name)),
                    );
                }
                continue;
            }
            let Some(current) = def.as_mut() else {
                continue;
            };

            match child.kind() {
                "=" | ":=" | "+=" => after_equals = true,
                "private" => {}
                ".." if after_equals => {
                    current.signature = Some("..".to_string());
                    after_equals = false;
                }
                "variant_declaration" => {
                    for ctor in self.members(child, false, &|c| {
                        if c.kind() == "constructor_declaration" {
                            self.constructor(c, DefinitionKind::Constructor).into_iter().collect()
                        } else {
                            Vec::new()
                        }
                    }) {
                        current.add_child(ctor);
                    }
                    after_equals = false;
                }
                "record_declaration" => {
                    for field in self.members(child, false, &|c| self.field(c).into_iter().collect()) {
                        current.add_child(field);
                    }
                    after_equals = false;
                }
                kind if after_equals && child.is_named() && !IGNORED_KINDS.contains(&kind) => {
                    if current.signature.is_none() {
                        current.signature = Some(collapse(self.text(child)));
                    }
                    after_equals = false;
                }
                _ => {}
            }
        }
        def
    }

    /// A variant constructor or an exception
    fn constructor(&self, node: Node<'_>, kind: DefinitionKind) -> Option<Definition> {
        let name_node = self.child_of_kind(node, &["constructor_name"])?;
        let name: String = self.text(name_node).split_whitespace().collect();
        let name = match name.as_str() {
            "(::)" => "::".to_string(),
            _ => name,
        };
        let mut def = Definition::new(kind, name).with_line(row(name_node));
        if let Some(signature) = self.text_after(node, &["of", ":", "="], &[]) {
            def = def.with_signature(signature);
        }
        Some(def)
    }

    fn field(&self, node: Node<'_>) -> Option<Definition> {
        if node.kind() != "field_declaration" {
            return None;
        }
        let name_node = self.child_of_kind(node, &["field_name"])?;
        let signature = self.text_after(node, &[":"], &[]).unwrap_or_default();
        Some(
            Definition::new(DefinitionKind::RecordField, self.text(name_node))
                .with_signature(signature)
                .with_line(row(name_node)),
        )
    }

    fn module_binding(&self, node: Node<'_>) -> Option<Definition> {
        let name_node = self.child_of_kind(node, &["module_name"])?;
        let mut def =
            Definition::new(DefinitionKind::Module, self.text(name_node)).with_line(row(name_node));

        let mut cursor = node.walk();
        let children = non_extra_children(node, &mut cursor);
        let mut iter = children.iter().copied();
        while let Some(child) = iter.next() {
            match child.kind() {
                ":" => {
                    if let Some(module_type) = iter.find(|c| c.is_named()) {
                        self.fill_from_module_type(&mut def, module_type);
                    }
                    break;
                }
                // Aliases: `module A = List`, `module A := B`
                "=" | ":=" => {
                    if let Some(body) = iter.find(|c| c.is_named()) {
                        def = def.with_signature(collapse(self.text(body)));
                    }
                    break;
                }
                _ => {}
            }
        }
        Some(def)
    }

    fn module_type_definition(&self, node: Node<'_>) -> Option<Definition> {
        let name_node = self.child_of_kind(node, &["module_type_name"])?;
        let mut def = Definition::new(DefinitionKind::ModuleType, self.text(name_node))
            .with_line(row(name_node));

        let mut cursor = node.walk();
        let children = non_extra_children(node, &mut cursor);
        if let Some(pos) = children.iter().position(|c| matches!(c.kind(), "=" | ":=")) {
            if let Some(body) = children[pos + 1..].iter().find(|c| c.is_named()) {
                self.fill_from_module_type(&mut def, *body);
            }
        }
        Some(def)
    }

    /// `sig .. end` bodies become children (through functor results and
    /// `with` constraints); any other module type is kept as text.
    fn fill_from_module_type(&self, def: &mut Definition, module_type: Node<'_>) {
        match self.signature_body(module_type) {
            Some(body) => {
                for child in self.signature_items(body) {
                    def.add_child(child);
                }
            }
            None => def.signature = Some(collapse(self.text(module_type))),
        }
    }

    fn signature_body<'t>(&self, module_type: Node<'t>) -> Option<Node<'t>> {
        match module_type.kind() {
            "signature" => Some(module_type),
            "functor_type" | "parenthesized_module_type" => {
                let count = module_type.named_child_count();
                let result = module_type.named_child(count.checked_sub(1)?)?;
                self.signature_body(result)
            }
            "module_type_constraint" => self.signature_body(module_type.named_child(0)?),
            _ => None,
        }
    }

    /// `class` and `class type` bindings. Object types become members;
    /// anything else is kept as text.
    fn class_binding(&self, node: Node<'_>, kind: DefinitionKind) -> Option<Definition> {
        let name_node = self.child_of_kind(node, &["class_name", "class_type_name"])?;
        let mut def = Definition::new(kind, self.text(name_node)).with_line(row(name_node));

        match find_descendant(node, "class_body_type") {
            Some(body) => {
                for member in self.members(body, false, &|c| self.class_member(c).into_iter().collect()) {
                    def.add_child(member);
                }
            }
            None => {
                if let Some(signature) = self.text_after(node, &[":", "="], &[]) {
                    def = def.with_signature(signature);
                }
            }
        }
        Some(def)
    }

    fn class_member(&self, node: Node<'_>) -> Option<Definition> {
        let (kind, name_kind) = match node.kind() {
            "method_specification" => (DefinitionKind::Method, "method_name"),
            "instance_variable_specification" => (DefinitionKind::Value, "instance_variable_name"),
            _ => return None,
        };
        let name_node = self.child_of_kind(node, &[name_kind])?;
        let signature = self.text_after(node, &[":"], &[]).unwrap_or_default();
        Some(
            Definition::new(kind, self.text(name_node))
                .with_signature(signature)
                .with_line(row(name_node)),
        )
    }
}

/// `( +. )` is named `+.`, `( .%() )` is named `.%()`
fn operator_name(text: &str) -> String {
    let inner = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(text);
    inner.split_whitespace().collect()
}

fn find_descendant<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    for child in children {
        if child.kind() == kind {
            return Some(child);
        }
        if let Some(found) = find_descendant(child, kind) {
            return Some(found);
        }
    }
    None
}
