use thiserror::Error;

use crate::DocumentId;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to fetch document {id}: {source}")]
    Fetch {
        id: DocumentId,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to decode document {id}: {source}")]
    Decode {
        id: DocumentId,
        #[source]
        source: anyhow::Error,
    },

    #[error("document {id} has no pages")]
    ZeroPages { id: DocumentId },

    #[error("failed to render page {page}: {source}")]
    Render {
        page: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("search failed: {source}")]
    Search {
        #[source]
        source: anyhow::Error,
    },
}

impl ViewerError {
    pub fn page(&self) -> Option<usize> {
        match self {
            ViewerError::Render { page, .. } => Some(*page),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn only_render_failures_carry_a_page() {
        let id = DocumentId::new("7");
        assert_eq!(ViewerError::ZeroPages { id: id.clone() }.page(), None);
        let fetch = ViewerError::Fetch {
            id,
            source: anyhow!("HTTP 404"),
        };
        assert_eq!(fetch.page(), None);

        let render = ViewerError::Render {
            page: 3,
            source: anyhow!("bitmap allocation failed"),
        };
        assert_eq!(render.page(), Some(3));
        assert_eq!(
            render.to_string(),
            "failed to render page 3: bitmap allocation failed"
        );
    }
}
