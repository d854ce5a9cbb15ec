//! The immutable country tree.
//!
//! Loaded once at startup from a JSON description and never mutated. The
//! tree is stored as a flat node array with parent indices — no owning
//! back-pointers — so ancestor walks are simple index chases. A reverse
//! index maps base file names to the node ids that share them (border
//! regions can appear under several parents with one file).
//!
//! # Source format
//!
//! ```json
//! {
//!   "v": 150101,
//!   "n": "Countries",
//!   "g": [
//!     { "n": "France", "g": [
//!       { "n": "France_Paris", "s": 12345, "rs": 678 }
//!     ]}
//!   ]
//! }
//! ```
//!
//! `v` is the current data version, `n` the node id, `s`/`rs` the declared
//! map and routing sizes (leaves only), `f` an optional file name override,
//! and `g` the ordered children (groups only).

use std::collections::HashMap;

use serde::Deserialize;

use mapdepot_core::{CatalogError, CountryFile, CountryId};

/// One node of the loaded country tree.
#[derive(Clone, Debug)]
pub struct Country {
    id: CountryId,
    parent: Option<usize>,
    children: Vec<usize>,
    file: Option<CountryFile>,
}

impl Country {
    /// Node id.
    #[must_use]
    pub fn id(&self) -> &CountryId {
        &self.id
    }

    /// File-naming record; present on leaves only.
    #[must_use]
    pub fn file(&self) -> Option<&CountryFile> {
        self.file.as_ref()
    }

    /// Whether this node is a downloadable map unit.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether this node is a group of map units.
    #[must_use]
    pub fn is_expandable(&self) -> bool {
        !self.children.is_empty()
    }

    /// Number of direct children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

#[derive(Deserialize)]
struct NodeDoc {
    n: String,
    #[serde(default)]
    f: Option<String>,
    #[serde(default)]
    s: u64,
    #[serde(default)]
    rs: u64,
    #[serde(default)]
    g: Vec<NodeDoc>,
}

#[derive(Deserialize)]
struct CatalogDoc {
    v: i64,
    #[serde(flatten)]
    root: NodeDoc,
}

/// The loaded country tree plus its lookup indexes.
pub struct CountryTree {
    nodes: Vec<Country>,
    by_id: HashMap<CountryId, usize>,
    by_file: HashMap<String, Vec<CountryId>>,
    version: i64,
}

impl CountryTree {
    /// Parse a country description document.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDoc = serde_json::from_str(text)?;
        let mut tree = Self {
            nodes: Vec::new(),
            by_id: HashMap::new(),
            by_file: HashMap::new(),
            version: doc.v,
        };
        tree.insert(&doc.root, None)?;
        Ok(tree)
    }

    fn insert(&mut self, doc: &NodeDoc, parent: Option<usize>) -> Result<usize, CatalogError> {
        let id = CountryId::new(doc.n.clone());
        if self.by_id.contains_key(&id) {
            return Err(CatalogError::DuplicateId(id));
        }

        let is_leaf = doc.g.is_empty();
        let file = is_leaf.then(|| {
            let name = doc.f.clone().unwrap_or_else(|| doc.n.clone());
            CountryFile::new(name, doc.s, doc.rs)
        });

        let index = self.nodes.len();
        self.nodes.push(Country {
            id: id.clone(),
            parent,
            children: Vec::new(),
            file,
        });
        self.by_id.insert(id.clone(), index);
        if let Some(file) = self.nodes[index].file.clone() {
            self.by_file
                .entry(file.name().to_string())
                .or_default()
                .push(id);
        }

        for child in &doc.g {
            let child_index = self.insert(child, Some(index))?;
            self.nodes[index].children.push(child_index);
        }
        Ok(index)
    }

    /// Current data version declared by the description.
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Id of the root node.
    #[must_use]
    pub fn root_id(&self) -> &CountryId {
        self.nodes[0].id()
    }

    /// Whether `id` names a node of this tree.
    #[must_use]
    pub fn contains(&self, id: &CountryId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Node by id.
    #[must_use]
    pub fn country(&self, id: &CountryId) -> Option<&Country> {
        self.by_id.get(id).map(|&i| &self.nodes[i])
    }

    /// Ordered direct children of `parent`.
    #[must_use]
    pub fn children_of(&self, parent: &CountryId) -> Vec<CountryId> {
        let Some(&index) = self.by_id.get(parent) else {
            return Vec::new();
        };
        self.nodes[index]
            .children
            .iter()
            .map(|&c| self.nodes[c].id.clone())
            .collect()
    }

    /// Parent id of `id`; `None` for the root and for unknown ids.
    #[must_use]
    pub fn parent_of(&self, id: &CountryId) -> Option<&CountryId> {
        let &index = self.by_id.get(id)?;
        self.nodes[index].parent.map(|p| self.nodes[p].id())
    }

    /// Ancestors of `id`, nearest first, root last. Does not include `id`.
    #[must_use]
    pub fn ancestors_of(&self, id: &CountryId) -> Vec<CountryId> {
        let mut chain = Vec::new();
        let Some(&index) = self.by_id.get(id) else {
            return chain;
        };
        let mut current = self.nodes[index].parent;
        while let Some(i) = current {
            chain.push(self.nodes[i].id.clone());
            current = self.nodes[i].parent;
        }
        chain
    }

    /// All leaf ids in the subtree rooted at `id`, in catalog order.
    ///
    /// A leaf id yields itself. Unknown ids yield nothing.
    #[must_use]
    pub fn leaves_under(&self, id: &CountryId) -> Vec<CountryId> {
        let Some(&index) = self.by_id.get(id) else {
            return Vec::new();
        };
        let mut leaves = Vec::new();
        // Depth-first with an explicit stack; children pushed in reverse to
        // preserve catalog order.
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if node.is_leaf() {
                leaves.push(node.id.clone());
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        leaves
    }

    /// Number of nodes in the subtree rooted at `id`, including `id`.
    #[must_use]
    pub fn countries_count(&self, id: &CountryId) -> usize {
        let Some(&index) = self.by_id.get(id) else {
            return 0;
        };
        let mut count = 0;
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            count += 1;
            stack.extend(&self.nodes[i].children);
        }
        count
    }

    /// First id whose file name is `name`.
    #[must_use]
    pub fn find_country_id_by_file(&self, name: &str) -> Option<&CountryId> {
        self.by_file.get(name).and_then(|ids| ids.first())
    }

    /// All ids sharing the file name `name`.
    #[must_use]
    pub fn find_all_indexes_by_file(&self, name: &str) -> &[CountryId] {
        self.by_file.get(name).map_or(&[], Vec::as_slice)
    }

    /// Display strings for a node: its group (parent below the root, if
    /// any) and its own name.
    #[must_use]
    pub fn group_and_country(&self, id: &CountryId) -> Option<(String, String)> {
        let &index = self.by_id.get(id)?;
        let group = self.nodes[index]
            .parent
            .filter(|&p| p != 0)
            .map(|p| self.nodes[p].id.to_string())
            .unwrap_or_default();
        Some((group, id.to_string()))
    }

    /// Iterate every node.
    pub fn iter(&self) -> impl Iterator<Item = &Country> {
        self.nodes.iter()
    }
}
