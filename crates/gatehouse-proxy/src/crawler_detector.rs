use gatehouse_core::DEFAULT_CRAWLER_SIGNATURES;

/// Matches User-Agent strings against known search engine and SEO crawlers
#[derive(Debug, Clone)]
pub struct CrawlerDetector {
    signatures: Vec<String>,
}

impl CrawlerDetector {
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let signatures = signatures
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { signatures }
    }

    /// Return the first signature contained in the lower-cased User-Agent
    pub fn detect(&self, user_agent: &str) -> Option<&str> {
        if user_agent.is_empty() {
            return None;
        }
        let user_agent = user_agent.to_lowercase();
        self.signatures
            .iter()
            .find(|signature| user_agent.contains(signature.as_str()))
            .map(String::as_str)
    }

    pub fn is_crawler(&self, user_agent: &str) -> bool {
        self.detect(user_agent).is_some()
    }
}

impl Default for CrawlerDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CRAWLER_SIGNATURES)
    }
}
