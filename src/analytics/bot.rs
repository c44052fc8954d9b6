//! User-Agent based bot detection
//!
//! A UA is a bot if woothee classifies it as a crawler, or if it contains any
//! entry of [`BOT_SIGNATURES`] anywhere (case-insensitive substring match).

use woothee::parser::Parser;

/// Lowercase substrings that mark a User-Agent as automated traffic.
pub const BOT_SIGNATURES: &[&str] = &[
    // Generic patterns
    "bot",
    "spider",
    "crawl",
    // Link-preview / unfurlers
    "facebookexternalhit",
    "facebot",
    "whatsapp",
    "slackbot",
    "telegrambot",
    "applebot",
    "twitterbot",
    "linkedinbot",
    "preview",
    // Google tooling
    "google web preview",
    "google favicon",
    "google-ad",
    "google-site-verification",
    "googlesecurityscanner",
    "google_analytics_snippet_validator",
    "chrome-lighthouse",
    // Security scanners
    "burpcollaborator.net/",
    "zgrab/",
    "netcraftsurveyagent/",
    "netcraft web server survey",
    // HTTP client libraries
    "go-http-client/",
    "curl/",
    "wget/",
    "python-requests/",
    "python-urllib/",
    "pycurl/",
    "java/",
    "libwww-perl/",
    "okhttp/",
    "ruby",
    // Headless browsers and renderers
    "headlesschrome/",
    "dumprendertree/",
    "phantomjs",
    "slimerjs",
    "wkhtmltoimage",
    "wkhtmltopdf",
    // Misc tools
    "admantx",
    "alexatoolbar/",
    "bingpreview/",
    "dataprovider.com",
    "faraday v",
    "gigablastopensource/",
    "owler/",
    "pageanalyzer/",
    "panscient.com",
    "ruxitrecorder/",
    "ruxitsynthetic/",
    "synapse",
    "tracemyfile/",
    "trendsmapresolver/",
    "ubermetrics-technologies.com",
    "wappalyzer",
    "whatweb/",
    "wininet",
    "wordpress.com",
    "wsr-agent/",
];

/// Returns true if the user agent looks like a bot or link-preview fetcher.
pub fn is_bot(user_agent: &str) -> bool {
    if is_crawler(user_agent) {
        return true;
    }

    let lower = user_agent.to_lowercase();
    BOT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// woothee's own crawler classification
pub(crate) fn is_crawler(user_agent: &str) -> bool {
    Parser::new()
        .parse(user_agent)
        .map(|result| result.category == "crawler")
        .unwrap_or(false)
}
