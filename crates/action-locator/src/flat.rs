//! Flattened view over every readable document.
//!
//! Same-origin frames and shadow trees are spliced in right after their host
//! element so document order, ancestry and proximity work across boundaries.
//! Cross-origin documents are never read.

use std::collections::HashMap;

use action_primitives::{ActionError, DocumentId, DocumentInfo, DomPort, ElementInfo, ElementRef};
use tracing::debug;

use crate::errors::LocatorError;

#[derive(Debug, Clone, Default)]
pub struct FlatDom {
    elements: Vec<ElementInfo>,
    index: HashMap<ElementRef, usize>,
    parents: HashMap<ElementRef, ElementRef>,
}

impl FlatDom {
    /// Reads the given documents (all readable ones when `only` is empty).
    pub async fn collect(port: &dyn DomPort, only: &[DocumentId]) -> Result<Self, LocatorError> {
        let mut parts = Vec::new();
        for doc in port.documents().await? {
            if !doc.origin.is_readable() {
                continue;
            }
            if !only.is_empty() && !only.contains(&doc.id) {
                continue;
            }
            match port.elements(&doc.id).await {
                Ok(elements) => parts.push((doc, elements)),
                Err(ActionError::CrossOrigin(id)) => {
                    debug!(document = %id, "skipping unreadable document");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Self::from_parts(parts))
    }

    pub fn from_parts(parts: Vec<(DocumentInfo, Vec<ElementInfo>)>) -> Self {
        let present: Vec<&DocumentId> = parts.iter().map(|(doc, _)| &doc.id).collect();
        let mut hosted: HashMap<ElementRef, Vec<usize>> = HashMap::new();
        let mut roots = Vec::new();
        for (idx, (doc, _)) in parts.iter().enumerate() {
            match &doc.host_element {
                Some(host) if present.contains(&&host.document) && host.document != doc.id => {
                    hosted.entry(host.clone()).or_default().push(idx);
                }
                _ => roots.push(idx),
            }
        }

        let mut flat = FlatDom::default();
        let mut visited = vec![false; parts.len()];
        for root in roots {
            flat.splice(&parts, root, &hosted, &mut visited);
        }
        flat
    }

    fn splice(
        &mut self,
        parts: &[(DocumentInfo, Vec<ElementInfo>)],
        doc_idx: usize,
        hosted: &HashMap<ElementRef, Vec<usize>>,
        visited: &mut [bool],
    ) {
        if visited[doc_idx] {
            return;
        }
        visited[doc_idx] = true;
        let (doc, elements) = &parts[doc_idx];
        for info in elements {
            let mut info = info.clone();
            let parent = info.parent.clone().or_else(|| doc.host_element.clone());
            if let Some(parent) = parent {
                self.parents.insert(info.element.clone(), parent);
            }
            info.dom_index = self.elements.len();
            self.index.insert(info.element.clone(), info.dom_index);
            let element = info.element.clone();
            self.elements.push(info);
            if let Some(children) = hosted.get(&element) {
                for child in children {
                    self.splice(parts, *child, hosted, visited);
                }
            }
        }
    }

    pub fn elements(&self) -> &[ElementInfo] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, el: &ElementRef) -> Option<&ElementInfo> {
        self.index.get(el).map(|idx| &self.elements[*idx])
    }

    pub fn parent(&self, el: &ElementRef) -> Option<&ElementRef> {
        self.parents.get(el)
    }

    /// Nearest first.
    pub fn ancestors(&self, el: &ElementRef) -> Vec<ElementRef> {
        let mut out = Vec::new();
        let mut cursor = self.parents.get(el);
        while let Some(parent) = cursor {
            if out.contains(parent) {
                break;
            }
            out.push(parent.clone());
            cursor = self.parents.get(parent);
        }
        out
    }

    pub fn is_descendant(&self, el: &ElementRef, ancestor: &ElementRef) -> bool {
        self.ancestors(el).iter().any(|a| a == ancestor)
    }

    /// Edges between `a` and `b` through their lowest common ancestor.
    pub fn tree_distance(&self, a: &ElementRef, b: &ElementRef) -> Option<usize> {
        if a == b {
            return Some(0);
        }
        let mut chain_a = vec![a.clone()];
        chain_a.extend(self.ancestors(a));
        let mut chain_b = vec![b.clone()];
        chain_b.extend(self.ancestors(b));
        chain_a.iter().enumerate().find_map(|(up_a, node)| {
            chain_b
                .iter()
                .position(|other| other == node)
                .map(|up_b| up_a + up_b)
        })
    }

    /// Descendants of `root` in document order.
    pub fn descendants<'a>(&'a self, root: &'a ElementRef) -> impl Iterator<Item = &'a ElementInfo> + 'a {
        self.elements
            .iter()
            .filter(move |info| self.is_descendant(&info.element, root))
    }

    pub fn by_id(&self, id: &str) -> Option<&ElementInfo> {
        self.elements.iter().find(|info| info.attr("id") == Some(id))
    }

    /// Depth in the flattened tree.
    pub fn depth(&self, el: &ElementRef) -> usize {
        self.ancestors(el).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::snapshot::SnapshotDocument;

    const PAGE: &str = r#"{
      "documents": [
        {"id": "main", "url": "https://shop.test/sell", "root": {"tag": "body", "children": [
          {"tag": "div", "attrs": {"id": "host"}},
          {"tag": "iframe", "attrs": {"id": "same"}},
          {"tag": "iframe", "attrs": {"id": "other"}},
          {"tag": "input", "attrs": {"id": "after"}}
        ]}},
        {"id": "shadow", "url": "https://shop.test/sell", "shadow": true,
         "host": {"document": "main", "element": "host"},
         "root": {"tag": "div", "children": [{"tag": "input", "attrs": {"id": "in-shadow"}}]}},
        {"id": "frame", "url": "https://shop.test/frame",
         "host": {"document": "main", "element": "same"},
         "root": {"tag": "body", "children": [{"tag": "input", "attrs": {"id": "in-frame"}}]}},
        {"id": "foreign", "url": "https://pay.other.test/",
         "host": {"document": "main", "element": "other"},
         "root": {"tag": "body", "children": [{"tag": "input", "attrs": {"id": "secret"}}]}}
      ]
    }"#;

    #[tokio::test]
    async fn splices_readable_documents_in_order() {
        let page = SnapshotDocument::from_json(PAGE).unwrap();
        let flat = FlatDom::collect(&page, &[]).await.unwrap();
        let ids: Vec<&str> = flat.elements().iter().filter_map(|e| e.attr("id")).collect();
        assert_eq!(ids, vec!["host", "in-shadow", "same", "in-frame", "other", "after"]);
        assert!(flat.by_id("secret").is_none());

        let in_shadow = flat.by_id("in-shadow").unwrap().element.clone();
        let host = flat.by_id("host").unwrap().element.clone();
        assert!(flat.is_descendant(&in_shadow, &host));
        assert_eq!(flat.tree_distance(&in_shadow, &host), Some(2));
    }
}
