//
// interface_parser/parser_pool.rs
//
// Thread-local OCaml interface parser for efficient parser reuse
//

use std::cell::RefCell;
use tree_sitter::Parser;

thread_local! {
    static PARSER: RefCell<Parser> = RefCell::new({
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_ocaml::LANGUAGE_OCAML_INTERFACE.into())
            .expect("Failed to set OCaml interface language");
        parser
    });
}

/// Execute a function with a thread-local parser instance.
/// The parser is reused across calls on the same thread, so rayon workers
/// and blocking tasks each keep their own.
pub fn with_parser<F, R>(f: F) -> R
where
    F: FnOnce(&mut Parser) -> R,
{
    PARSER.with(|parser| f(&mut parser.borrow_mut()))
}

/// Collect non-extra (non-comment) children of a tree-sitter node.
pub(crate) fn non_extra_children<'a>(
    node: tree_sitter::Node<'a>,
    cursor: &mut tree_sitter::TreeCursor<'a>,
) -> Vec<tree_sitter::Node<'a>> {
    node.children(cursor).filter(|c| !c.is_extra()).collect()
}
