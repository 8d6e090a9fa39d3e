//! Node registry, fuzzy lookup, and pick policy (§3, §4.5).
//!
//! Grounded on `examples/original_source/discord-bot/gridbot/entity.py`'s
//! `Node`/`NodeTable`/`EjectedNode`, generalized per this crate's design
//! note: the "ejected" variant is a flag on a uniform `Node` record rather
//! than a parallel subtype, so `NodeTable`'s value type stays uniform (§9
//! "Ejected-node stub").

use indexmap::IndexMap;

/// A node in the grid.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    version: Option<String>,
    ejected: bool,
}

impl Node {
    fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Node {
            name: name.into(),
            version,
            ejected: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// A node is live simply by virtue of being present in the table; this
    /// accessor exists for callers that only hold a `&Node`.
    pub fn is_ejected(&self) -> bool {
        self.ejected
    }

    /// Whether this node can currently accept new job submissions.
    pub fn can_accept_jobs(&self) -> bool {
        !self.ejected
    }
}

/// Outcome of a fuzzy node-name lookup (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeMatch<'a> {
    /// No node matched `q` at all.
    None,
    /// Exactly one node matched.
    Single(&'a str),
    /// More than one node matched; these are candidates for the caller to
    /// disambiguate.
    Ambiguous(Vec<&'a str>),
}

/// Registry of known nodes, plus a table-global "locus" pick hint.
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: IndexMap<String, Node>,
    locus: Option<String>,
}

impl NodeTable {
    pub fn new() -> Self {
        NodeTable::default()
    }

    /// Seeds the table-global locus, e.g. from a configured `target_node`.
    pub fn with_locus(mut self, locus: Option<String>) -> Self {
        self.locus = locus;
        self
    }

    pub fn has_nodes(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn node_present(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn get_node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Registers or updates a node's last-reported version.
    pub fn node_seen(&mut self, name: &str, version: Option<String>) -> &Node {
        self.nodes
            .entry(name.to_owned())
            .and_modify(|n| {
                n.version = version.clone();
                n.ejected = false;
            })
            .or_insert_with(|| Node::new(name, version));
        self.nodes.get(name).expect("just inserted")
    }

    /// Removes a node from the table entirely.
    pub fn node_gone(&mut self, name: &str) {
        self.nodes.shift_remove(name);
        if self.locus.as_deref() == Some(name) {
            self.locus = None;
        }
    }

    /// Replaces `name`'s entry with an ejected stub and returns whether a
    /// node by that name existed to eject.
    pub fn eject(&mut self, name: &str) -> bool {
        match self.nodes.get_mut(name) {
            Some(node) => {
                node.ejected = true;
                true
            },
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn locus(&self) -> Option<&str> {
        self.locus.as_deref()
    }

    /// Picker policy for a locus-less request (§4.5): prefer the
    /// table-global locus if it's still present and able to accept jobs;
    /// otherwise fall back to the first insertion-order node that can
    /// accept jobs, latching it as the new locus.
    pub fn pick_node(&mut self) -> Option<&Node> {
        if let Some(locus) = self.locus.clone() {
            if self
                .nodes
                .get(&locus)
                .is_some_and(Node::can_accept_jobs)
            {
                return self.nodes.get(&locus);
            }
        }

        let picked = self
            .nodes
            .values()
            .find(|n| n.can_accept_jobs())
            .map(|n| n.name.clone());

        if let Some(name) = picked {
            self.locus = Some(name.clone());
            return self.nodes.get(&name);
        }

        None
    }

    /// Fuzzy lookup per §4.5: exact match wins outright; otherwise
    /// case-insensitive equality; otherwise prefix match; otherwise empty.
    pub fn nodes_by_name(&self, query: &str) -> Vec<&Node> {
        if let Some(node) = self.nodes.get(query) {
            return vec![node];
        }

        let ci: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.name.eq_ignore_ascii_case(query))
            .collect();
        if !ci.is_empty() {
            return ci;
        }

        self.nodes
            .values()
            .filter(|n| n.name.starts_with(query))
            .collect()
    }

    /// Same as [`NodeTable::nodes_by_name`] collapsed into a match summary,
    /// handy for command handlers that branch on none/one/many.
    pub fn lookup(&self, query: &str) -> NodeMatch<'_> {
        let matches = self.nodes_by_name(query);
        match matches.len() {
            0 => NodeMatch::None,
            1 => NodeMatch::Single(matches[0].name()),
            _ => NodeMatch::Ambiguous(matches.iter().map(|n| n.name()).collect()),
        }
    }
}

impl<'a> IntoIterator for &'a NodeTable {
    type Item = &'a Node;
    type IntoIter = indexmap::map::Values<'a, String, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_seen_and_gone() {
        let mut table = NodeTable::new();
        assert!(!table.has_nodes());
        assert!(!table.node_present("hal"));

        table.node_seen("hal", None);
        assert!(table.has_nodes());
        assert!(table.node_present("hal"));

        table.node_gone("hal");
        assert!(!table.has_nodes());
        assert!(!table.node_present("hal"));
    }

    #[test]
    fn iter_sees_every_node() {
        let mut table = NodeTable::new();
        for name in ["hal", "AM", "Wintermute"] {
            table.node_seen(name, Some("test".to_owned()));
        }
        let names: Vec<&str> = table.iter().map(Node::name).collect();
        assert_eq!(names.len(), 3);
        for n in ["hal", "AM", "Wintermute"] {
            assert!(names.contains(&n));
        }
    }

    #[test]
    fn fuzzy_lookup_case_insensitive() {
        let mut table = NodeTable::new();
        for name in ["hal", "HAL", "Wintermute"] {
            table.node_seen(name, Some("test".to_owned()));
        }

        assert_eq!(table.nodes_by_name("Jane").len(), 0);

        let exact = table.nodes_by_name("Wintermute");
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].name(), "Wintermute");

        let exact2 = table.nodes_by_name("HAL");
        assert_eq!(exact2.len(), 1);
        assert_eq!(exact2[0].name(), "HAL");

        let ci_single = table.nodes_by_name("WINTERMUTE");
        assert_eq!(ci_single.len(), 1);
        assert_eq!(ci_single[0].name(), "Wintermute");

        let mut ci_multi: Vec<&str> = table.nodes_by_name("Hal").iter().map(|n| n.name()).collect();
        ci_multi.sort();
        assert_eq!(ci_multi, vec!["HAL", "hal"]);
    }

    #[test]
    fn fuzzy_lookup_prefix() {
        let mut table = NodeTable::new();
        for name in [
            "spam",
            "eggs",
            "spam-and-eggs",
            "spam-bacon-and-eggs",
            "baked-beans-and-spam",
        ] {
            table.node_seen(name, Some("test".to_owned()));
        }

        assert_eq!(table.nodes_by_name("sausage").len(), 0);

        let eggs = table.nodes_by_name("eggs");
        assert_eq!(eggs.len(), 1);
        assert_eq!(eggs[0].name(), "eggs");

        // exact match wins over prefix match
        let spam = table.nodes_by_name("spam");
        assert_eq!(spam.len(), 1);
        assert_eq!(spam[0].name(), "spam");

        let baked = table.nodes_by_name("baked-");
        assert_eq!(baked.len(), 1);
        assert_eq!(baked[0].name(), "baked-beans-and-spam");

        let mut ambiguous: Vec<&str> =
            table.nodes_by_name("spam-").iter().map(|n| n.name()).collect();
        ambiguous.sort();
        assert_eq!(ambiguous, vec!["spam-and-eggs", "spam-bacon-and-eggs"]);
    }

    #[test]
    fn pick_node_prefers_locus_then_falls_back() {
        let mut table = NodeTable::new();
        table.node_seen("a", None);
        table.node_seen("b", None);

        // no locus yet: picks first insertion-order node and latches it
        let picked = table.pick_node().unwrap().name().to_owned();
        assert_eq!(picked, "a");
        assert_eq!(table.locus(), Some("a"));

        // locus still present: keeps returning it
        assert_eq!(table.pick_node().unwrap().name(), "a");

        // locus gone: falls back to the next acceptable node
        table.node_gone("a");
        assert_eq!(table.pick_node().unwrap().name(), "b");
    }

    #[test]
    fn pick_node_uses_insertion_order_not_alphabetical() {
        let mut table = NodeTable::new();
        table.node_seen("z", None);
        table.node_seen("a", None);

        // "z" was seen first, so it's picked despite sorting after "a"
        let picked = table.pick_node().unwrap().name().to_owned();
        assert_eq!(picked, "z");
        assert_eq!(table.locus(), Some("z"));
    }

    #[test]
    fn ejected_node_refuses_but_stays_in_table() {
        let mut table = NodeTable::new();
        table.node_seen("a", None);
        assert!(table.eject("a"));
        assert!(table.node_present("a"));
        assert!(!table.get_node("a").unwrap().can_accept_jobs());
        assert!(!table.eject("missing"));
    }

    #[test]
    fn pick_node_skips_ejected_locus() {
        let mut table = NodeTable::new();
        table.node_seen("a", None);
        table.node_seen("b", None);
        table.pick_node(); // latches "a"
        table.eject("a");
        assert_eq!(table.pick_node().unwrap().name(), "b");
    }
}
