//! Threat feed catalog, fetchers and parsers
//!
//! Range feeds contribute CIDR blocks (datacenter / hosting providers),
//! address feeds contribute individual IPs (Tor exits, blocklists). Every
//! line parser skips blank lines, `#` comments and malformed entries.

use ipnet::IpNet;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use thiserror::Error;

const DATACENTER_RANGES_URL: &str =
    "https://raw.githubusercontent.com/jhassine/server-ip-addresses/master/data/datacenters.txt";
const OCI_RANGES_URL: &str = "https://docs.cloud.oracle.com/en-us/iaas/tools/public_ip_ranges.json";
const DIGITALOCEAN_RANGES_URL: &str = "https://www.digitalocean.com/geo/google.csv";
const VULTR_RANGES_URL: &str = "https://geofeed.constant.com/?text";

const TOR_EXIT_URL: &str = "https://check.torproject.org/torbulkexitlist";
const IPSUM_URL: &str = "https://raw.githubusercontent.com/stamparm/ipsum/master/ipsum.txt";
const GREENSNOW_URL: &str = "https://blocklist.greensnow.co/greensnow.txt";

/// Providers without a downloadable feed
pub const AKAMAI_RANGES: &[&str] = &[
    "23.32.0.0/11", "23.192.0.0/11", "2.16.0.0/13", "104.64.0.0/10",
    "184.24.0.0/13", "23.0.0.0/12", "95.100.0.0/15", "92.122.0.0/15",
    "184.50.0.0/15", "88.221.0.0/16", "23.64.0.0/14", "72.246.0.0/15",
    "96.16.0.0/15", "96.6.0.0/15", "69.192.0.0/16", "23.72.0.0/13",
    "173.222.0.0/15", "118.214.0.0/16", "184.84.0.0/14",
];

pub const SCALEWAY_RANGES: &[&str] = &[
    "62.210.0.0/16", "195.154.0.0/16", "212.129.0.0/18", "62.4.0.0/19",
    "212.83.128.0/19", "212.83.160.0/19", "212.47.224.0/19", "163.172.0.0/16",
    "51.15.0.0/16", "151.115.0.0/16", "51.158.0.0/15",
];

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Payload format of a remote feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    /// One CIDR per line
    CidrLines,
    /// `{"regions": [{"cidrs": [{"cidr": "..."}]}]}`
    RegionJson,
    /// CSV with the CIDR in the first column
    CsvFirstColumn,
    /// One IP per line
    IpLines,
    /// `ip<TAB>score` lines
    IpScoreLines,
}

impl FeedFormat {
    pub fn yields_ranges(&self) -> bool {
        matches!(
            self,
            FeedFormat::CidrLines | FeedFormat::RegionJson | FeedFormat::CsvFirstColumn
        )
    }
}

#[derive(Debug, Clone)]
pub enum FeedSource {
    Remote {
        name: String,
        url: String,
        format: FeedFormat,
    },
    /// Hardcoded CIDR list, no network fetch
    Static { name: String, cidrs: Vec<String> },
}

impl FeedSource {
    pub fn remote(name: &str, url: &str, format: FeedFormat) -> Self {
        FeedSource::Remote {
            name: name.to_string(),
            url: url.to_string(),
            format,
        }
    }

    pub fn fixed(name: &str, cidrs: &[&str]) -> Self {
        FeedSource::Static {
            name: name.to_string(),
            cidrs: cidrs.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FeedSource::Remote { name, .. } | FeedSource::Static { name, .. } => name,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, FeedSource::Remote { .. })
    }
}

/// What a single feed contributed to a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedData {
    Ranges(Vec<IpNet>),
    Addresses(Vec<IpAddr>),
}

/// The production feed catalog
pub fn default_feeds() -> Vec<FeedSource> {
    vec![
        FeedSource::remote("datacenters", DATACENTER_RANGES_URL, FeedFormat::CidrLines),
        FeedSource::remote("oci", OCI_RANGES_URL, FeedFormat::RegionJson),
        FeedSource::remote("digitalocean", DIGITALOCEAN_RANGES_URL, FeedFormat::CsvFirstColumn),
        FeedSource::remote("vultr", VULTR_RANGES_URL, FeedFormat::CidrLines),
        FeedSource::fixed("akamai", AKAMAI_RANGES),
        FeedSource::fixed("scaleway", SCALEWAY_RANGES),
        FeedSource::remote("tor", TOR_EXIT_URL, FeedFormat::IpLines),
        FeedSource::remote("ipsum", IPSUM_URL, FeedFormat::IpScoreLines),
        FeedSource::remote("greensnow", GREENSNOW_URL, FeedFormat::IpLines),
    ]
}

/// Fetch (if remote) and parse one feed.
///
/// The client carries the per-request timeout.
pub async fn load(client: &Client, source: &FeedSource) -> Result<FeedData, FeedError> {
    match source {
        FeedSource::Static { cidrs, .. } => Ok(FeedData::Ranges(parse_cidr_list(cidrs))),
        FeedSource::Remote { url, format, .. } => {
            let body = client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            parse_body(*format, &body)
        }
    }
}

pub fn parse_body(format: FeedFormat, body: &str) -> Result<FeedData, FeedError> {
    let data = match format {
        FeedFormat::CidrLines => FeedData::Ranges(parse_cidr_lines(body)),
        FeedFormat::RegionJson => FeedData::Ranges(parse_region_json(body)?),
        FeedFormat::CsvFirstColumn => FeedData::Ranges(parse_csv_first_column(body)?),
        FeedFormat::IpLines => FeedData::Addresses(parse_ip_lines(body)),
        FeedFormat::IpScoreLines => FeedData::Addresses(parse_ip_score_lines(body)),
    };
    Ok(data)
}

/// Non-blank, non-comment lines, trimmed
fn content_lines(body: &str) -> impl Iterator<Item = &str> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

fn parse_cidr(value: &str) -> Option<IpNet> {
    value.trim().parse::<IpNet>().ok().map(|net| net.trunc())
}

pub fn parse_cidr_lines(body: &str) -> Vec<IpNet> {
    content_lines(body).filter_map(parse_cidr).collect()
}

pub fn parse_cidr_list<S: AsRef<str>>(cidrs: &[S]) -> Vec<IpNet> {
    cidrs.iter().filter_map(|c| parse_cidr(c.as_ref())).collect()
}

#[derive(Debug, Deserialize)]
struct RegionDocument {
    #[serde(default)]
    regions: Vec<Region>,
}

#[derive(Debug, Deserialize)]
struct Region {
    #[serde(default)]
    cidrs: Vec<RegionCidr>,
}

#[derive(Debug, Deserialize)]
struct RegionCidr {
    #[serde(default)]
    cidr: String,
}

pub fn parse_region_json(body: &str) -> Result<Vec<IpNet>, serde_json::Error> {
    let document: RegionDocument = serde_json::from_str(body)?;

    Ok(document
        .regions
        .iter()
        .flat_map(|region| region.cidrs.iter())
        .filter_map(|entry| parse_cidr(&entry.cidr))
        .collect())
}

pub fn parse_csv_first_column(body: &str) -> Result<Vec<IpNet>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(body.as_bytes());

    let mut ranges = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(net) = record.get(0).and_then(parse_cidr) {
            ranges.push(net);
        }
    }
    Ok(ranges)
}

pub fn parse_ip_lines(body: &str) -> Vec<IpAddr> {
    content_lines(body)
        .filter_map(|line| line.parse::<IpAddr>().ok())
        .map(|ip| ip.to_canonical())
        .collect()
}

pub fn parse_ip_score_lines(body: &str) -> Vec<IpAddr> {
    content_lines(body)
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|ip| ip.parse::<IpAddr>().ok())
        .map(|ip| ip.to_canonical())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_lines_all_valid() {
        let body = "10.0.0.0/8\n192.168.1.0/24\n2001:db8::/32\n";
        let ranges = parse_cidr_lines(body);
        assert_eq!(ranges.len(), 3);
    }

    #[test]
    fn test_cidr_lines_skips_comments_blank_and_malformed() {
        let body = "# header\n\n10.0.0.0/8\n  \nnot-a-cidr\n172.16.0.0/12\n10.0.0.1\n999.0.0.0/8\n";
        let ranges = parse_cidr_lines(body);
        assert_eq!(
            ranges,
            vec![
                "10.0.0.0/8".parse::<IpNet>().unwrap(),
                "172.16.0.0/12".parse::<IpNet>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_cidr_host_bits_are_truncated() {
        let ranges = parse_cidr_lines("10.1.2.3/8");
        assert_eq!(ranges, vec!["10.0.0.0/8".parse::<IpNet>().unwrap()]);
    }

    #[test]
    fn test_region_json() {
        let body = r#"{
            "last_updated_timestamp": "2024-01-01",
            "regions": [
                {"region": "us-ashburn-1", "cidrs": [{"cidr": "129.213.0.0/16", "tags": ["OCI"]}, {"cidr": "bogus"}]},
                {"region": "eu-frankfurt-1", "cidrs": [{"cidr": "130.61.0.0/16"}]},
                {"region": "empty"}
            ]
        }"#;
        let ranges = parse_region_json(body).unwrap();
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn test_region_json_malformed_document() {
        assert!(parse_region_json("<html>oops</html>").is_err());
        assert!(matches!(
            parse_body(FeedFormat::RegionJson, "{"),
            Err(FeedError::Json(_))
        ));
    }

    #[test]
    fn test_csv_first_column() {
        let body = "5.101.96.0/21,NL,NL-NH,Amsterdam,1098 XH\n\
                    # comment\n\
                    45.55.32.0/19,US,US-NY,New York,10011\n\
                    junk,US,,,\n\
                    2604:a880::/32,US\n";
        let ranges = parse_csv_first_column(body).unwrap();
        assert_eq!(ranges.len(), 3);
    }

    #[test]
    fn test_ip_lines() {
        let body = "# tor exits\n1.2.3.4\n\n5.6.7.8\nnonsense\n2001:db8::1\n";
        let ips = parse_ip_lines(body);
        assert_eq!(ips.len(), 3);
        assert!(ips.contains(&"1.2.3.4".parse().unwrap()));
    }

    #[test]
    fn test_ip_score_lines() {
        let body = "# IPsum Threat Intelligence Feed\n# ip\tscore\n1.2.3.4\t8\n5.6.7.8\t3\nbad\t1\n";
        let ips = parse_ip_score_lines(body);
        assert_eq!(
            ips,
            vec![
                "1.2.3.4".parse::<IpAddr>().unwrap(),
                "5.6.7.8".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_static_lists_parse_fully() {
        assert_eq!(parse_cidr_list(AKAMAI_RANGES).len(), AKAMAI_RANGES.len());
        assert_eq!(parse_cidr_list(SCALEWAY_RANGES).len(), SCALEWAY_RANGES.len());
    }

    #[test]
    fn test_default_catalog_shape() {
        let feeds = default_feeds();
        assert_eq!(feeds.len(), 9);

        let address_feeds = feeds
            .iter()
            .filter(|f| matches!(f, FeedSource::Remote { format, .. } if !format.yields_ranges()))
            .count();
        assert_eq!(address_feeds, 3);
    }

    #[tokio::test]
    async fn test_load_static_feed_needs_no_network() {
        let client = Client::new();
        let data = load(&client, &FeedSource::fixed("test", &["10.0.0.0/8", "garbage"]))
            .await
            .unwrap();
        assert_eq!(data, FeedData::Ranges(vec!["10.0.0.0/8".parse().unwrap()]));
    }
}
