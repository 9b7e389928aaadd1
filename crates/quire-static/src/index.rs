//! Site index: settings plus the ordered list of posts.

use chrono::{DateTime, SecondsFormat, Utc};
use quire_md::{parse_frontmatter, FieldError, Frontmatter, FrontmatterError};
use serde::{Serialize, Serializer};

use crate::post::Post;

/// Settings file in the source directory. Frontmatter only, its body is ignored.
pub const SETTINGS_FILENAME: &str = "_index.md";

/// Site-level metadata, read once per build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Site {
    pub title: String,

    /// Root URL of the published site
    pub url: String,

    /// URL of the feed document
    pub xml_url: String,

    /// Build start time, RFC 3339 in templates
    #[serde(serialize_with = "serialize_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Site {
    /// Read the settings frontmatter. `title`, `url` and `xmlurl` are all required.
    pub fn from_frontmatter(
        frontmatter: &Frontmatter,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, FieldError> {
        Ok(Self {
            title: frontmatter.string("title")?,
            url: frontmatter.string("url")?,
            xml_url: frontmatter.string("xmlurl")?,
            updated_at,
        })
    }

    /// Parse the settings file contents.
    pub fn parse(source: &[u8], updated_at: DateTime<Utc>) -> Result<Self, SettingsError> {
        let (frontmatter, _) = parse_frontmatter(source)?;
        Ok(Self::from_frontmatter(&frontmatter, updated_at)?)
    }
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// The blog as seen by the index page and feed templates.
#[derive(Debug, Clone, Serialize)]
pub struct Index {
    #[serde(flatten)]
    pub site: Site,

    /// Published posts, most recent first once sorted
    pub posts: Vec<Post>,
}

impl Index {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            posts: Vec::new(),
        }
    }

    pub fn push(&mut self, post: Post) {
        self.posts.push(post);
    }

    /// Order posts by date, most recent first.
    ///
    /// The sort is stable, so posts sharing a date keep their discovery order.
    /// Undated posts sort last.
    pub fn sort(&mut self) {
        self.posts.sort_by(|a, b| b.date.cmp(&a.date));
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Errors that can occur when reading the settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Frontmatter(#[from] FrontmatterError),

    #[error(transparent)]
    Field(#[from] FieldError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    fn post(slug: &str, date: Option<(i32, u32, u32)>) -> Post {
        Post {
            slug: slug.to_string(),
            title: slug.to_string(),
            xml_title: slug.to_string(),
            date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            draft: false,
            short: false,
            body: String::new(),
            description: String::new(),
            xml_desc: String::new(),
            link: String::new(),
            relative_link: String::new(),
            output_path: String::new(),
        }
    }

    fn site() -> Site {
        Site {
            title: "Blog".into(),
            url: "https://blog.example".into(),
            xml_url: "https://blog.example/index.xml".into(),
            updated_at: now(),
        }
    }

    #[test]
    fn reads_settings() {
        let source = b"---\ntitle: My Blog\nurl: https://blog.example/\nxmlurl: https://blog.example/index.xml\n---\nignored body\n";

        let site = Site::parse(source, now()).unwrap();

        assert_eq!(site.title, "My Blog");
        assert_eq!(site.url, "https://blog.example/");
        assert_eq!(site.xml_url, "https://blog.example/index.xml");
        assert_eq!(site.updated_at, now());
    }

    #[test]
    fn settings_require_all_fields() {
        let source = b"---\ntitle: My Blog\nurl: https://blog.example/\n---\n";

        let err = Site::parse(source, now()).unwrap_err();

        assert!(matches!(err, SettingsError::Field(FieldError::MissingField(ref f)) if f == "xmlurl"));
    }

    #[test]
    fn settings_require_frontmatter() {
        let err = Site::parse(b"title: nope\n", now()).unwrap_err();

        assert!(matches!(err, SettingsError::Frontmatter(FrontmatterError::Missing)));
    }

    #[test]
    fn sorts_by_date_descending_keeping_ties_stable() {
        let mut index = Index::new(site());
        index.push(post("a", Some((2020, 1, 1))));
        index.push(post("b", Some((2021, 6, 15))));
        index.push(post("c", Some((2020, 1, 1))));
        index.push(post("undated", None));

        index.sort();

        let order: Vec<_> = index.posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(order, ["b", "a", "c", "undated"]);
    }

    #[test]
    fn serializes_flat_with_timestamp() {
        let mut index = Index::new(site());
        index.push(post("a", Some((2020, 1, 1))));

        let value = minijinja::Value::from_serialize(&index);

        assert_eq!(value.get_attr("title").unwrap().as_str(), Some("Blog"));
        assert_eq!(
            value.get_attr("updated_at").unwrap().as_str(),
            Some("2024-03-01T12:30:00Z")
        );
        assert_eq!(value.get_attr("posts").unwrap().len(), Some(1));
    }
}
