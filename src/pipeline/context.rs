use futures::future::join_all;

use super::{RankedResult, SearchPipeline};

impl SearchPipeline {
    /// Scrape the top `max_results` pages concurrently and join them into one
    /// context block, best-ranked source first.
    pub async fn gather_context(&self, ranked: &[RankedResult], max_results: usize) -> String {
        let top = &ranked[..ranked.len().min(max_results)];

        let pages = join_all(top.iter().map(|result| self.engine.scrape(&result.hit.url))).await;

        top.iter()
            .zip(pages)
            .enumerate()
            .filter(|(_, (_, content))| !content.is_empty())
            .map(|(i, (result, content))| {
                format!(
                    "Source {}: {} ({})\n\n{}\n\n",
                    i + 1,
                    result.hit.title,
                    result.hit.url,
                    content
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
