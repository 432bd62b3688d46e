//! Snippet library file: a markdown document where each `## path/to/name`
//! heading starts a snippet whose body runs up to the next heading.

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Snippet {
    pub(crate) name: String,
    pub(crate) body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TreeItem {
    pub(crate) label: String,
    pub(crate) depth: usize,
    pub(crate) snippet_index: Option<usize>,
}

pub(crate) fn parse_library(content: &str) -> Vec<Snippet> {
    let mut snippets = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in content.lines() {
        if let Some(name) = parse_heading(line) {
            if let Some((name, body)) = current.take() {
                snippets.push(finish_snippet(name, &body));
            }
            current = Some((name, String::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }

    if let Some((name, body)) = current {
        snippets.push(finish_snippet(name, &body));
    }
    snippets
}

fn finish_snippet(name: String, body: &str) -> Snippet {
    let body = body.strip_suffix('\n').unwrap_or(body);
    let body = body.strip_suffix('\r').unwrap_or(body);
    Snippet {
        name,
        body: body.to_string(),
    }
}

fn parse_heading(line: &str) -> Option<String> {
    let rest = line.strip_prefix("##")?;
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let name = rest.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Flattens `/`-separated snippet names into a depth-annotated folder tree,
/// in order of first appearance.
pub(crate) fn build_tree(snippets: &[Snippet]) -> Vec<TreeItem> {
    let mut root = TreeNode::default();
    for (index, snippet) in snippets.iter().enumerate() {
        let parts: Vec<&str> = snippet
            .name
            .split('/')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        root.insert(&parts, index);
    }

    let mut items = Vec::new();
    root.flatten(0, &mut items);
    items
}

#[derive(Debug, Default)]
struct TreeNode {
    name: String,
    snippet_index: Option<usize>,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn insert(&mut self, parts: &[&str], snippet_index: usize) {
        let Some((first, rest)) = parts.split_first() else {
            self.snippet_index = Some(snippet_index);
            return;
        };
        let position = match self.children.iter().position(|child| child.name == *first) {
            Some(position) => position,
            None => {
                self.children.push(TreeNode {
                    name: first.to_string(),
                    ..TreeNode::default()
                });
                self.children.len() - 1
            }
        };
        self.children[position].insert(rest, snippet_index);
    }

    fn flatten(&self, depth: usize, items: &mut Vec<TreeItem>) {
        for child in &self.children {
            items.push(TreeItem {
                label: child.name.clone(),
                depth,
                snippet_index: child.snippet_index,
            });
            child.flatten(depth + 1, items);
        }
    }
}
