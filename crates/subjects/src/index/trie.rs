use super::EntryHandle;

const NIL: u32 = u32::MAX;

/// Fixed-size trie node.  Children form a singly linked sibling list so every
/// node has the same layout and the whole trie lives in one `Vec`.
#[derive(Debug, Clone, Copy)]
struct Node {
    ch: char,
    first_child: u32,
    next_sibling: u32,
    /// Index into `TokenTrie::postings`, or `NIL` when no token ends here.
    postings: u32,
}

impl Node {
    fn new(ch: char) -> Self {
        Self {
            ch,
            first_child: NIL,
            next_sibling: NIL,
            postings: NIL,
        }
    }
}

/// Arena-allocated character trie mapping tokens to entry handles.
///
/// Built once per index generation and dropped wholesale on rebuild; there is
/// no removal path.
#[derive(Debug, Clone)]
pub struct TokenTrie {
    nodes: Vec<Node>,
    postings: Vec<Vec<EntryHandle>>,
}

impl Default for TokenTrie {
    fn default() -> Self {
        Self {
            nodes: vec![Node::new('\0')],
            postings: Vec::new(),
        }
    }
}

impl TokenTrie {
    /// Register `handle` under `token`.
    ///
    /// Handles must be inserted in non-decreasing order; posting lists then
    /// stay sorted and deduplicated without a final pass.
    pub fn insert(&mut self, token: &str, handle: EntryHandle) {
        if token.is_empty() {
            return;
        }
        let mut node = 0u32;
        for ch in token.chars() {
            node = self.child_or_insert(node, ch);
        }

        let slot = self.nodes[node as usize].postings;
        let list = if slot == NIL {
            self.postings.push(Vec::new());
            let idx = (self.postings.len() - 1) as u32;
            self.nodes[node as usize].postings = idx;
            &mut self.postings[idx as usize]
        } else {
            &mut self.postings[slot as usize]
        };
        if list.last() != Some(&handle) {
            list.push(handle);
        }
    }

    /// Handles registered under exactly `token`.
    pub fn exact(&self, token: &str) -> &[EntryHandle] {
        match self.find(token) {
            Some(node) => self.postings_of(node),
            None => &[],
        }
    }

    /// Handles of every token starting with `prefix`, depth-first, at most
    /// `limit` distinct handles.
    pub fn prefix(&self, prefix: &str, limit: usize) -> Vec<EntryHandle> {
        let mut out: Vec<EntryHandle> = Vec::new();
        let Some(start) = self.find(prefix) else {
            return out;
        };

        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &handle in self.postings_of(node) {
                if out.len() == limit {
                    return out;
                }
                if !out.contains(&handle) {
                    out.push(handle);
                }
            }
            // Push children in reverse so the first child is visited first.
            let mut children = Vec::new();
            let mut child = self.nodes[node as usize].first_child;
            while child != NIL {
                children.push(child);
                child = self.nodes[child as usize].next_sibling;
            }
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Number of distinct tokens stored.
    pub fn token_count(&self) -> usize {
        self.postings.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn find(&self, token: &str) -> Option<u32> {
        let mut node = 0u32;
        for ch in token.chars() {
            node = self.child(node, ch)?;
        }
        Some(node)
    }

    fn postings_of(&self, node: u32) -> &[EntryHandle] {
        match self.nodes[node as usize].postings {
            NIL => &[],
            slot => &self.postings[slot as usize],
        }
    }

    fn child(&self, parent: u32, ch: char) -> Option<u32> {
        let mut child = self.nodes[parent as usize].first_child;
        while child != NIL {
            if self.nodes[child as usize].ch == ch {
                return Some(child);
            }
            child = self.nodes[child as usize].next_sibling;
        }
        None
    }

    fn child_or_insert(&mut self, parent: u32, ch: char) -> u32 {
        let mut last = NIL;
        let mut child = self.nodes[parent as usize].first_child;
        while child != NIL {
            if self.nodes[child as usize].ch == ch {
                return child;
            }
            last = child;
            child = self.nodes[child as usize].next_sibling;
        }

        self.nodes.push(Node::new(ch));
        let idx = (self.nodes.len() - 1) as u32;
        if last == NIL {
            self.nodes[parent as usize].first_child = idx;
        } else {
            self.nodes[last as usize].next_sibling = idx;
        }
        idx
    }
}
