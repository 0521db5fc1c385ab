//! Result types produced by a pipeline run.

use serde::{Deserialize, Serialize};

/// Recognised text for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page number in the source PDF.
    pub page_index: usize,
    /// Raw engine output. Empty when the engine found nothing, never absent.
    pub text: String,
    /// Engine-reported mean confidence, 0.0–1.0.
    pub mean_confidence: f32,
}

/// Display data for one page: confidence plus two inline previews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    /// 1-based page number, same as the matching [`PageResult`].
    pub page_index: usize,
    pub mean_confidence: f32,
    /// 300 px wide PNG as a `data:` URI.
    pub thumbnail: Option<String>,
    /// At most 1200 px wide PNG as a `data:` URI.
    pub full_preview: Option<String>,
}

/// The complete output of one run.
///
/// `pages` and `page_infos` are aligned index-for-index, in source page
/// order, numbered 1..=N without gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub pages: Vec<PageResult>,
    /// All pages, each under a `--- Page N (conf P%) ---` header.
    pub combined_text: String,
    pub page_infos: Vec<PageInfo>,
}

impl PipelineResult {
    /// Number of pages that were processed.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Mean of the per-page confidences, or `None` for an empty result.
    pub fn average_confidence(&self) -> Option<f32> {
        if self.pages.is_empty() {
            return None;
        }
        let sum: f32 = self.pages.iter().map(|p| p.mean_confidence).sum();
        Some(sum / self.pages.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_confidence() {
        let r = PipelineResult {
            pages: vec![
                PageResult {
                    page_index: 1,
                    text: "a".into(),
                    mean_confidence: 0.5,
                },
                PageResult {
                    page_index: 2,
                    text: "b".into(),
                    mean_confidence: 1.0,
                },
            ],
            combined_text: String::new(),
            page_infos: vec![],
        };
        assert_eq!(r.page_count(), 2);
        assert_eq!(r.average_confidence(), Some(0.75));
    }

    #[test]
    fn empty_result_has_no_average() {
        let r = PipelineResult {
            pages: vec![],
            combined_text: String::new(),
            page_infos: vec![],
        };
        assert_eq!(r.average_confidence(), None);
    }

    #[test]
    fn serialises_missing_previews_as_null() {
        let info = PageInfo {
            page_index: 1,
            mean_confidence: 0.9,
            thumbnail: None,
            full_preview: Some("data:image/png;base64,AAAA".into()),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert!(json["thumbnail"].is_null());
        assert_eq!(json["full_preview"], "data:image/png;base64,AAAA");
    }
}
