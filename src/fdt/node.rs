//! Structure block traversal.
//!
//! Every primitive works by forward offset arithmetic from a token
//! position. Skips re-check the block bounds before each step and report
//! "no further data" as `None`; callers decide whether that is an error.

use super::{read_be32, token, Fdt, FdtError};

/// Position of a begin-node token in the structure block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node(usize);

/// Position of a property token in the structure block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prop(usize);

impl Node {
    /// Byte offset of the token within the structure block.
    pub fn offset(self) -> usize {
        self.0
    }
}

impl Prop {
    /// Byte offset of the token within the structure block.
    pub fn offset(self) -> usize {
        self.0
    }
}

/// Round a byte count up to the next token boundary.
#[inline]
fn pad4(len: usize) -> Option<usize> {
    Some(len.checked_add(3)? & !3)
}

impl<'a> Fdt<'a> {
    /// Skip no-op tokens; `None` if the block runs out first.
    fn skip_nops(&self, mut off: usize) -> Option<usize> {
        while self.word(off)? == token::NOP {
            off += 4;
        }
        Some(off)
    }

    /// Skip a NUL-terminated node name starting at `off`.
    fn skip_name(&self, off: usize) -> Option<usize> {
        let name = self.structs().get(off..)?;
        let nul = name.iter().position(|&b| b == 0)?;
        let next = off.checked_add(pad4(nul + 1)?)?;
        if next >= self.struct_len() {
            return None;
        }
        self.skip_nops(next)
    }

    /// Skip one property token, its length and name words and the padded
    /// value.
    fn skip_prop(&self, off: usize) -> Option<usize> {
        if self.word(off)? != token::PROP {
            return None;
        }
        let len = self.word(off + 4)? as usize;
        self.word(off + 8)?;
        let next = (off + 12).checked_add(pad4(len)?)?;
        if next >= self.struct_len() {
            return None;
        }
        self.skip_nops(next)
    }

    /// Skip every property at `off`, returning the first non-property token.
    fn skip_props(&self, mut off: usize) -> Option<usize> {
        while self.word(off)? == token::PROP {
            off = self.skip_prop(off)?;
        }
        Some(off)
    }

    /// Skip past the node name and properties to the first token after them.
    fn node_body(&self, node: Node) -> Option<usize> {
        if self.word(node.0)? != token::BEGIN_NODE {
            return None;
        }
        let off = self.skip_name(node.0 + 4)?;
        self.skip_props(off)
    }

    /// Skip a whole subtree: the node, its properties and all descendants,
    /// including the closing end-node token.
    ///
    /// Nesting is tracked with a counter, so a deeply nested blob cannot
    /// exhaust the stack.
    fn skip_node(&self, node: Node) -> Option<usize> {
        let mut depth = 0usize;
        let mut off = node.0;
        loop {
            match self.word(off)? {
                token::BEGIN_NODE => {
                    off = self.skip_name(off + 4)?;
                    off = self.skip_props(off)?;
                    depth += 1;
                }
                token::END_NODE => {
                    depth = depth.checked_sub(1)?;
                    off = self.skip_nops(off + 4)?;
                    if depth == 0 {
                        return Some(off);
                    }
                }
                _ => return None,
            }
        }
    }

    fn node_at(&self, off: usize) -> Option<Node> {
        (self.word(off)? == token::BEGIN_NODE).then_some(Node(off))
    }

    fn prop_at(&self, off: usize) -> Option<Prop> {
        (self.word(off)? == token::PROP).then_some(Prop(off))
    }

    /// The root node.
    pub fn first_node(&self) -> Option<Node> {
        let off = self.skip_nops(0)?;
        self.node_at(off)
    }

    /// The node following `node` at the same depth.
    pub fn next_sibling(&self, node: Node) -> Option<Node> {
        let off = self.skip_node(node)?;
        self.node_at(off)
    }

    /// The first child of `node`.
    pub fn first_child(&self, node: Node) -> Option<Node> {
        let off = self.node_body(node)?;
        self.node_at(off)
    }

    /// The name following the begin-node token; empty for the root.
    ///
    /// `None` if the padded name does not leave room for a following token
    /// within the block, or is not UTF-8.
    pub fn node_name(&self, node: Node) -> Option<&'a str> {
        if self.word(node.0)? != token::BEGIN_NODE {
            return None;
        }
        let start = node.0 + 4;
        self.skip_name(start)?;
        let raw = self.structs().get(start..)?;
        let nul = raw.iter().position(|&b| b == 0)?;
        core::str::from_utf8(&raw[..nul]).ok()
    }

    /// The first property of `node`.
    pub fn first_property(&self, node: Node) -> Option<Prop> {
        if self.word(node.0)? != token::BEGIN_NODE {
            return None;
        }
        let off = self.skip_name(node.0 + 4)?;
        self.prop_at(off)
    }

    /// The property following `prop` within the same node.
    pub fn next_property(&self, prop: Prop) -> Option<Prop> {
        let off = self.skip_prop(prop.0)?;
        self.prop_at(off)
    }

    /// Resolve the property name through the strings block.
    pub fn property_name(&self, prop: Prop) -> Result<&'a str, FdtError> {
        if self.word(prop.0) != Some(token::PROP) {
            return Err(FdtError::InvalidReference);
        }
        let name_off = self.word(prop.0 + 8).ok_or(FdtError::InvalidReference)? as usize;
        let raw = self
            .strings()
            .get(name_off..)
            .filter(|raw| !raw.is_empty())
            .ok_or(FdtError::InvalidReference)?;
        let nul = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or(FdtError::BadString)?;
        core::str::from_utf8(&raw[..nul]).map_err(|_| FdtError::BadString)
    }

    /// The raw value bytes; the slice length is the property length.
    ///
    /// `None` if the padded value does not leave room for a following token
    /// within the block, the same bound [`Fdt::next_property`] applies.
    pub fn property_value(&self, prop: Prop) -> Option<&'a [u8]> {
        self.skip_prop(prop.0)?;
        let len = self.word(prop.0 + 4)? as usize;
        let start = prop.0 + 12;
        self.structs().get(start..start.checked_add(len)?)
    }

    /// A property holding exactly one big-endian cell.
    pub fn prop_u32(&self, prop: Prop) -> Option<u32> {
        let value = self.property_value(prop)?;
        if value.len() != 4 {
            return None;
        }
        read_be32(value, 0)
    }

    /// Look up a node by absolute path, e.g. `/chosen`.
    ///
    /// A path component without `@` also matches a node whose name carries
    /// a unit address, so `/memory` finds `memory@40000000`.
    pub fn find_node(&self, path: &str) -> Option<Node> {
        let mut node = self.first_node()?;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            node = self.children(node).find(|&child| {
                self.node_name(child)
                    .is_some_and(|name| name_matches(name, component))
            })?;
        }
        Some(node)
    }

    /// Look up a property of `node` by name.
    pub fn find_property(&self, node: Node, name: &str) -> Option<Prop> {
        self.properties(node)
            .find(|&prop| self.property_name(prop) == Ok(name))
    }

    /// Iterate over the children of `node`.
    pub fn children(&self, node: Node) -> Children<'_, 'a> {
        Children {
            fdt: self,
            next: self.first_child(node),
        }
    }

    /// Iterate over the properties of `node`.
    pub fn properties(&self, node: Node) -> Properties<'_, 'a> {
        Properties {
            fdt: self,
            next: self.first_property(node),
        }
    }
}

fn name_matches(name: &str, component: &str) -> bool {
    if name == component {
        return true;
    }
    if component.contains('@') {
        return false;
    }
    name.split_once('@')
        .is_some_and(|(base, _)| base == component)
}

/// Iterator over the direct children of a node.
pub struct Children<'f, 'a> {
    fdt: &'f Fdt<'a>,
    next: Option<Node>,
}

impl Iterator for Children<'_, '_> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let node = self.next?;
        self.next = self.fdt.next_sibling(node);
        Some(node)
    }
}

/// Iterator over the properties of a node.
pub struct Properties<'f, 'a> {
    fdt: &'f Fdt<'a>,
    next: Option<Prop>,
}

impl Iterator for Properties<'_, '_> {
    type Item = Prop;

    fn next(&mut self) -> Option<Prop> {
        let prop = self.next?;
        self.next = self.fdt.next_property(prop);
        Some(prop)
    }
}
