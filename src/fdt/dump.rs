//! Human-readable rendering of a device tree.

use core::fmt;

use super::{Fdt, Node};

/// Deeper nodes are elided rather than recursed into.
const MAX_DEPTH: usize = 16;

/// Displays node names indented by depth, with property names and lengths.
pub struct TreeDump<'f, 'a> {
    fdt: &'f Fdt<'a>,
}

impl<'f, 'a> TreeDump<'f, 'a> {
    pub(super) fn new(fdt: &'f Fdt<'a>) -> Self {
        Self { fdt }
    }

    fn node(&self, f: &mut fmt::Formatter<'_>, node: Node, depth: usize) -> fmt::Result {
        let indent = depth * 2;
        match self.fdt.node_name(node) {
            Some("") => writeln!(f, "{:indent$}/", "")?,
            Some(name) => writeln!(f, "{:indent$}{name}", "")?,
            None => writeln!(f, "{:indent$}<unnamed>", "")?,
        }

        for prop in self.fdt.properties(node) {
            let len = self.fdt.property_value(prop).map(<[u8]>::len);
            match (self.fdt.property_name(prop), len) {
                (Ok(name), Some(len)) => {
                    writeln!(f, "{:w$}property: {name}, length: {len:#x}", "", w = indent + 2)?
                }
                (Ok(name), None) => {
                    writeln!(f, "{:w$}property: {name}, truncated", "", w = indent + 2)?
                }
                (Err(err), _) => writeln!(f, "{:w$}property: <{err}>", "", w = indent + 2)?,
            }
        }

        if depth + 1 >= MAX_DEPTH {
            if self.fdt.first_child(node).is_some() {
                writeln!(f, "{:w$}...", "", w = indent + 2)?;
            }
            return Ok(());
        }
        for child in self.fdt.children(node) {
            self.node(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for TreeDump<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fdt.first_node() {
            Some(root) => self.node(f, root, 0),
            None => writeln!(f, "found no node"),
        }
    }
}
