use crate::text_index::contains_ignore_case;
use crate::PageLayout;

/// Marks text-layer nodes matching a query. Only node highlight flags are
/// touched; the layout structure belongs to the render pass.
#[derive(Debug, Default)]
pub struct HighlightOverlay {
    query: Option<String>,
    marked: usize,
}

impl HighlightOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn len(&self) -> usize {
        self.marked
    }

    pub fn is_empty(&self) -> bool {
        self.marked == 0
    }

    /// Clears every previous mark, then marks each node containing `query`.
    /// Returns the number of marked nodes.
    pub fn apply(&mut self, layout: &mut PageLayout, query: &str) -> usize {
        self.clear(layout);

        let query = query.trim();
        if query.is_empty() {
            return 0;
        }

        for page in layout.pages_mut() {
            for node in page.text_layer.nodes_mut() {
                if contains_ignore_case(&node.text, query) {
                    node.set_highlighted(true);
                    self.marked += 1;
                }
            }
        }
        self.query = Some(query.to_owned());
        self.marked
    }

    /// Safe to call with nothing highlighted or on an empty layout.
    pub fn clear(&mut self, layout: &mut PageLayout) {
        for page in layout.pages_mut() {
            for node in page.text_layer.nodes_mut() {
                node.set_highlighted(false);
            }
        }
        self.marked = 0;
        self.query = None;
    }

    /// Drops marks whose nodes went away with the layout, keeping the query
    /// so it can be applied to the next render pass.
    pub fn detach(&mut self) {
        self.marked = 0;
    }

    /// Re-applies the active query to a freshly committed layout.
    pub fn reapply(&mut self, layout: &mut PageLayout) -> usize {
        match self.query.take() {
            Some(query) => self.apply(layout, &query),
            None => 0,
        }
    }
}
