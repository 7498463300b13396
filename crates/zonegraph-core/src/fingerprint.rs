//! Hosting, CDN and mail provider detection by hostname suffix.

use serde::{Deserialize, Serialize};

/// Built-in `(pattern, provider)` pairs, most specific first.
pub const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    ("cloudfront.net", "Amazon CloudFront"),
    ("elb.amazonaws.com", "AWS Elastic Load Balancing"),
    ("s3.amazonaws.com", "Amazon S3"),
    ("awsglobalaccelerator.com", "AWS Global Accelerator"),
    ("amazonaws.com", "Amazon Web Services"),
    ("azurewebsites.net", "Azure App Service"),
    ("azureedge.net", "Azure CDN"),
    ("azurefd.net", "Azure Front Door"),
    ("trafficmanager.net", "Azure Traffic Manager"),
    ("cloudapp.azure.com", "Azure"),
    ("mail.protection.outlook.com", "Microsoft 365"),
    ("outlook.com", "Microsoft 365"),
    ("ghs.googlehosted.com", "Google Sites"),
    ("googlehosted.com", "Google"),
    ("google.com", "Google Workspace"),
    ("googlemail.com", "Google Workspace"),
    ("appspot.com", "Google App Engine"),
    ("web.app", "Firebase Hosting"),
    ("firebaseapp.com", "Firebase Hosting"),
    ("cdn.cloudflare.net", "Cloudflare"),
    ("cloudflare.net", "Cloudflare"),
    ("pages.dev", "Cloudflare Pages"),
    ("workers.dev", "Cloudflare Workers"),
    ("fastly.net", "Fastly"),
    ("fastlylb.net", "Fastly"),
    ("akamaiedge.net", "Akamai"),
    ("akamai.net", "Akamai"),
    ("edgekey.net", "Akamai"),
    ("edgesuite.net", "Akamai"),
    ("github.io", "GitHub Pages"),
    ("netlify.app", "Netlify"),
    ("netlify.com", "Netlify"),
    ("vercel-dns.com", "Vercel"),
    ("vercel.app", "Vercel"),
    ("herokudns.com", "Heroku"),
    ("herokuapp.com", "Heroku"),
    ("myshopify.com", "Shopify"),
    ("squarespace.com", "Squarespace"),
    ("wixdns.net", "Wix"),
    ("wordpress.com", "WordPress.com"),
    ("wpengine.com", "WP Engine"),
    ("zendesk.com", "Zendesk"),
    ("hubspot.net", "HubSpot"),
    ("b-cdn.net", "Bunny CDN"),
    ("digitaloceanspaces.com", "DigitalOcean Spaces"),
    ("ondigitalocean.app", "DigitalOcean App Platform"),
    ("fly.dev", "Fly.io"),
    ("render.com", "Render"),
    ("onrender.com", "Render"),
    ("mailgun.org", "Mailgun"),
    ("sendgrid.net", "SendGrid"),
    ("amazonses.com", "Amazon SES"),
    ("mimecast.com", "Mimecast"),
    ("pphosted.com", "Proofpoint"),
    ("messagingengine.com", "Fastmail"),
    ("zoho.com", "Zoho Mail"),
    ("protonmail.ch", "Proton Mail"),
];

/// A provider match for one hostname
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedService {
    /// Hostname that matched
    pub target: String,
    /// Provider name
    pub provider: String,
    /// Pattern that matched
    pub pattern: String,
}

/// Ordered suffix matcher. The first matching pattern wins.
#[derive(Debug, Clone)]
pub struct ServiceFingerprinter {
    patterns: Vec<(String, String)>,
}

impl Default for ServiceFingerprinter {
    fn default() -> Self {
        Self::new(
            DEFAULT_PATTERNS
                .iter()
                .map(|(pattern, provider)| ((*pattern).to_string(), (*provider).to_string())),
        )
    }
}

impl ServiceFingerprinter {
    /// Build from a custom pattern list, kept in the given order.
    ///
    /// Patterns are lowercased and lose any leading dot.
    pub fn new<I>(patterns: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|(pattern, provider)| {
                    (pattern.trim().trim_start_matches('.').to_lowercase(), provider)
                })
                .filter(|(pattern, _)| !pattern.is_empty())
                .collect(),
        }
    }

    /// Configured patterns in match order
    #[must_use]
    pub fn patterns(&self) -> &[(String, String)] {
        &self.patterns
    }

    /// Provider for a normalized hostname
    #[must_use]
    pub fn detect(&self, host: &str) -> Option<DetectedService> {
        self.patterns
            .iter()
            .find(|(pattern, _)| matches_suffix(host, pattern))
            .map(|(pattern, provider)| DetectedService {
                target: host.to_string(),
                provider: provider.clone(),
                pattern: pattern.clone(),
            })
    }
}

/// Exact match, or `pattern` is a whole-label suffix of `host`
fn matches_suffix(host: &str, pattern: &str) -> bool {
    host.strip_suffix(pattern)
        .is_some_and(|rest| rest.is_empty() || rest.ends_with('.'))
}
