//! The scroll container: rendered pages stacked vertically, each raster
//! paired with a text layer positioned identically over it.

use crate::{RenderImage, TextItem, TextRect, Viewport};

#[derive(Debug, Clone)]
pub struct TextNode {
    pub text: String,
    /// Position over the raster, in viewport pixels.
    pub rect: TextRect,
    highlighted: bool,
}

impl TextNode {
    pub fn new(text: impl Into<String>, rect: TextRect) -> Self {
        Self {
            text: text.into(),
            rect,
            highlighted: false,
        }
    }

    pub fn is_highlighted(&self) -> bool {
        self.highlighted
    }

    pub(crate) fn set_highlighted(&mut self, highlighted: bool) {
        self.highlighted = highlighted;
    }
}

#[derive(Debug, Clone)]
pub struct TextLayer {
    pub width: f32,
    pub height: f32,
    nodes: Vec<TextNode>,
}

impl TextLayer {
    pub fn from_items(items: &[TextItem], viewport: &Viewport) -> Self {
        let nodes = items
            .iter()
            .filter(|item| !item.text.trim().is_empty())
            .map(|item| TextNode::new(item.text.clone(), item.rect.scaled(viewport.scale)))
            .collect();
        Self {
            width: viewport.width,
            height: viewport.height,
            nodes,
        }
    }

    pub fn nodes(&self) -> &[TextNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [TextNode] {
        &mut self.nodes
    }

    pub fn highlighted(&self) -> impl Iterator<Item = &TextNode> {
        self.nodes.iter().filter(|node| node.is_highlighted())
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-based.
    pub page_number: usize,
    pub viewport: Viewport,
    pub raster: RenderImage,
    pub text_layer: TextLayer,
    /// Distance from the top of the container to the top of this page.
    pub offset_top: f32,
}

impl RenderedPage {
    pub fn bottom(&self) -> f32 {
        self.offset_top + self.viewport.height
    }
}

#[derive(Debug, Clone)]
pub struct PageLayout {
    pages: Vec<RenderedPage>,
    padding: f32,
    gap: f32,
    scroll_top: f32,
}

impl PageLayout {
    pub fn new(padding: f32, gap: f32) -> Self {
        Self {
            pages: Vec::new(),
            padding,
            gap,
            scroll_top: 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.scroll_top = 0.0;
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[RenderedPage] {
        &self.pages
    }

    pub(crate) fn pages_mut(&mut self) -> &mut [RenderedPage] {
        &mut self.pages
    }

    pub fn page(&self, page_number: usize) -> Option<&RenderedPage> {
        page_number
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
    }

    pub fn push_page(
        &mut self,
        page_number: usize,
        viewport: Viewport,
        raster: RenderImage,
        text_layer: TextLayer,
    ) {
        let offset_top = match self.pages.last() {
            Some(last) => last.bottom() + self.gap,
            None => self.padding,
        };
        self.pages.push(RenderedPage {
            page_number,
            viewport,
            raster,
            text_layer,
            offset_top,
        });
    }

    pub fn content_height(&self) -> f32 {
        match self.pages.last() {
            Some(last) => last.bottom() + self.padding,
            None => 0.0,
        }
    }

    pub fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    pub fn set_scroll_top(&mut self, scroll_top: f32) {
        self.scroll_top = if scroll_top.is_finite() {
            scroll_top.min(self.content_height()).max(0.0)
        } else {
            0.0
        };
    }

    /// Scrolls so the top of `page_number` is at the top of the viewport.
    /// Returns the new offset, or `None` when the page is not laid out.
    pub fn scroll_into_view(&mut self, page_number: usize) -> Option<f32> {
        let offset = self.page(page_number)?.offset_top;
        self.scroll_top = offset;
        Some(offset)
    }

    /// The page occupying the top edge of the viewport at `scroll_top`.
    pub fn page_at(&self, scroll_top: f32) -> Option<usize> {
        let last = self.pages.last()?;
        let half_gap = self.gap / 2.0;
        let page = self
            .pages
            .iter()
            .find(|page| scroll_top < page.bottom() + half_gap)
            .unwrap_or(last);
        Some(page.page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(width: f32, height: f32, scale: f32) -> Viewport {
        Viewport {
            width,
            height,
            scale,
        }
    }

    fn blank() -> RenderImage {
        RenderImage {
            width: 1,
            height: 1,
            pixels: vec![0; 4],
        }
    }

    fn layout_with_pages(count: usize) -> PageLayout {
        let mut layout = PageLayout::new(32.0, 20.0);
        for page_number in 1..=count {
            let viewport = viewport(600.0, 800.0, 1.0);
            let text_layer = TextLayer::from_items(&[], &viewport);
            layout.push_page(page_number, viewport, blank(), text_layer);
        }
        layout
    }

    #[test]
    fn pages_are_stacked_with_padding_and_gap() {
        let layout = layout_with_pages(3);
        let offsets: Vec<f32> = layout.pages().iter().map(|p| p.offset_top).collect();
        assert_eq!(offsets, vec![32.0, 852.0, 1672.0]);
        assert_eq!(layout.content_height(), 1672.0 + 800.0 + 32.0);
    }

    #[test]
    fn scroll_into_view_and_page_at_agree() {
        let mut layout = layout_with_pages(3);
        assert_eq!(layout.scroll_into_view(2), Some(852.0));
        assert_eq!(layout.page_at(layout.scroll_top()), Some(2));
        assert_eq!(layout.scroll_into_view(4), None);
        assert_eq!(layout.scroll_top(), 852.0);

        assert_eq!(layout.page_at(0.0), Some(1));
        assert_eq!(layout.page_at(845.0), Some(2));
        assert_eq!(layout.page_at(10_000.0), Some(3));
        assert_eq!(PageLayout::new(0.0, 0.0).page_at(0.0), None);
    }

    #[test]
    fn scroll_with_nan_spacing_does_not_panic() {
        let mut layout = PageLayout::new(f32::NAN, 20.0);
        let viewport = viewport(600.0, 800.0, 1.0);
        let text_layer = TextLayer::from_items(&[], &viewport);
        layout.push_page(1, viewport, blank(), text_layer);

        layout.set_scroll_top(100.0);
        assert!(layout.scroll_top() >= 0.0);
    }

    #[test]
    fn text_layer_matches_viewport_scale() {
        let viewport = viewport(300.0, 400.0, 0.5);
        let items = vec![
            TextItem {
                text: "Alpha".into(),
                rect: TextRect {
                    x: 100.0,
                    y: 40.0,
                    width: 60.0,
                    height: 12.0,
                },
            },
            TextItem {
                text: "  ".into(),
                rect: TextRect::default(),
            },
        ];
        let layer = TextLayer::from_items(&items, &viewport);
        assert_eq!(layer.nodes().len(), 1);
        assert_eq!(layer.width, 300.0);
        assert_eq!(
            layer.nodes()[0].rect,
            TextRect {
                x: 50.0,
                y: 20.0,
                width: 30.0,
                height: 6.0
            }
        );
        assert!(!layer.nodes()[0].is_highlighted());
    }
}
