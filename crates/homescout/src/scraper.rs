use std::path::Path;
use std::time::Duration;

use reqwest::Client;

use crate::csv::{CsvError, CsvWriter};
use crate::parser::{self, Listing, LISTING_COLUMNS};

pub(crate) const SITE_ROOT: &str = "https://www.redfin.com";

/// Default search: Jefferson Parish houses/townhouses/multifamily under the
/// configured price and size thresholds.
pub const DEFAULT_SEARCH_URL: &str = "https://www.redfin.com/county/1255/LA/Jefferson-Parish/filter/property-type=house+townhouse+multifamily,max-price=220k,min-beds=2,min-baths=1.5,min-sqft=1.2k-sqft,hoa=0";

// The listing site rejects non-browser user agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),
}

#[derive(Debug, Clone)]
pub struct ListingScraper {
    client: Client,
    search_url: String,
    page_delay: Duration,
}

impl ListingScraper {
    pub fn new(search_url: impl Into<String>) -> Result<ListingScraper, ScrapeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(BROWSER_USER_AGENT)
            .build()?;

        Ok(ListingScraper {
            client,
            search_url: search_url.into(),
            page_delay: Duration::from_secs(1),
        })
    }

    fn page_url(&self, page: usize) -> String {
        if page > 1 {
            format!("{}/page-{}", self.search_url, page)
        } else {
            self.search_url.clone()
        }
    }

    /// Fetches one results page. `Ok(None)` marks the end of pagination:
    /// either a non-success status or a page with no listing cards.
    async fn fetch_page(&self, page: usize) -> Result<Option<Vec<Listing>>, ScrapeError> {
        let url = self.page_url(page);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            log::info!("Stopping at page {} ({})", page, response.status());
            return Ok(None);
        }

        let html = response.text().await?;
        let listings = parser::parse_listing_cards(&html, SITE_ROOT);
        if listings.is_empty() {
            log::info!("No more listings on page {}", page);
            return Ok(None);
        }
        Ok(Some(listings))
    }

    /// Walks the paginated search results until they run out, with a polite
    /// delay between pages.
    pub async fn scrape_all(&self) -> Result<Vec<Listing>, ScrapeError> {
        let mut all = Vec::new();
        let mut page = 1;
        while let Some(listings) = self.fetch_page(page).await? {
            log::info!("Page {}: {} listings", page, listings.len());
            all.extend(listings);
            page += 1;
            tokio::time::sleep(self.page_delay).await;
        }
        Ok(all)
    }
}

/// First stage of the chain: scrape every listing and write the raw CSV.
pub async fn run_scrape_stage(
    scraper: &ListingScraper,
    output: &Path,
) -> Result<usize, ScrapeError> {
    let listings = scraper.scrape_all().await?;

    let header: Vec<String> = LISTING_COLUMNS.iter().map(|s| s.to_string()).collect();
    let mut writer = CsvWriter::create(output, &header)?;
    for listing in &listings {
        writer.write_record(&listing.to_record())?;
    }

    log::info!("Saved {} listings to {}", listings.len(), output.display());
    Ok(listings.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_numbering() {
        let scraper = ListingScraper::new("https://example.com/search").unwrap();
        assert_eq!(scraper.page_url(1), "https://example.com/search");
        assert_eq!(scraper.page_url(2), "https://example.com/search/page-2");
    }
}
