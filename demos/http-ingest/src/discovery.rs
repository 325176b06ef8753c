use async_trait::async_trait;
use queue_core::{DiscoveryHook, NewWorkItem, WorkItem, WorkPayload};
use serde_json::Value;

/// Extracts same-host `href` targets from a fetched page and enqueues them
/// as new `Fetch` items, bounded by depth so a dense site cannot run away.
/// `depth` is threaded through `WorkItem::rank`: shallow, intentionally not
/// a real crawl-scoping engine (robots.txt, canonicalization, etc. are out
/// of scope for this demo).
pub struct LinkDiscovery {
    max_depth: u32,
}

impl LinkDiscovery {
    pub fn new(max_depth: u32) -> Self {
        Self { max_depth }
    }

    fn extract_hrefs(html: &str, base_host: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut rest = html;
        while let Some(start) = rest.find("href=\"") {
            rest = &rest[start + 6..];
            let Some(end) = rest.find('"') else { break };
            let candidate = &rest[..end];
            rest = &rest[end..];
            if candidate.starts_with("http://") || candidate.starts_with("https://") {
                if candidate.contains(base_host) {
                    found.push(candidate.to_string());
                }
            }
        }
        found
    }
}

#[async_trait]
impl DiscoveryHook for LinkDiscovery {
    async fn discover(&self, output: Option<&Value>, parent: &WorkItem) -> Vec<NewWorkItem> {
        let depth = parent.rank.unwrap_or(0);
        if depth >= self.max_depth as i32 {
            return Vec::new();
        }

        let WorkPayload::Fetch { request_uri, .. } = &parent.payload else {
            return Vec::new();
        };
        let Some(html) = output.and_then(|v| v.get("body")).and_then(|v| v.as_str()) else {
            return Vec::new();
        };
        let Ok(parsed) = url::Url::parse(request_uri) else {
            return Vec::new();
        };
        let Some(host) = parsed.host_str() else {
            return Vec::new();
        };

        Self::extract_hrefs(html, host)
            .into_iter()
            .map(|link| NewWorkItem {
                source_system: parent.source_system.clone(),
                source_name: parent.source_name.clone(),
                resource_type: "page".into(),
                resource_id: link.clone(),
                variant: None,
                payload: WorkPayload::Fetch {
                    request_uri: link,
                    request_method: "GET".into(),
                    request_headers: None,
                    request_body: None,
                },
                priority: parent.priority,
                run_id: parent.run_id.clone(),
                discovered_from: Some(parent.work_item_id),
                rank: Some(depth + 1),
            })
            .collect()
    }
}
