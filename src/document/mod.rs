//! Site configuration document model.
//!
//! The whole editable website surface lives in one JSON document. At the
//! storage layer every top-level key is optional; [`SiteConfig::default`]
//! supplies the fallback for each of them. Merging is shallow: a key present
//! in an overlay replaces the base value for that key wholesale.
//!
//! Section values are kept as raw JSON. The typed structs below are read-only
//! views for callers that want them; nothing on the sync path decodes through
//! them, so fields they do not declare survive refresh and save untouched.

mod defaults;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raw stored form of a configuration document (top-level JSON object).
pub type Document = Map<String, Value>;

/// Errors raised when editing a single top-level section
#[derive(Error, Debug)]
pub enum SectionError {
    #[error("Unknown section: {0}")]
    Unknown(String),

    #[error("Invalid value for section {section}: expected {expected}")]
    Invalid {
        section: Section,
        expected: &'static str,
    },
}

/// The full site configuration as seen by editor panels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteConfig {
    doc: Document,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeroSlide {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub image_url: String,
    pub cta_label: String,
    pub cta_href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    /// Free-form: `"From $49"` and `49` are both seen in the wild
    pub price: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AboutSection {
    pub heading: String,
    pub body: String,
    pub image_url: String,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavLink {
    pub id: String,
    pub label: String,
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Navigation {
    pub main: Vec<NavLink>,
    pub legal: Vec<NavLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SocialLink {
    pub id: String,
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Footer {
    pub text: String,
    pub copyright: String,
    pub social: Vec<SocialLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Seo {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub og_image_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapLocation {
    pub lat: f64,
    pub lng: f64,
    pub zoom: f64,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Testimonial {
    pub id: String,
    pub author: String,
    pub role: String,
    pub quote: String,
    pub rating: f64,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GalleryItem {
    pub id: String,
    pub image_url: String,
    pub caption: String,
}

/// Known top-level keys of the configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    SiteName,
    Tagline,
    LogoUrl,
    ContactEmail,
    ContactPhone,
    HeroSlides,
    Services,
    About,
    Navigation,
    Footer,
    Seo,
    Map,
    Testimonials,
    Gallery,
}

impl Section {
    pub const ALL: [Section; 14] = [
        Section::SiteName,
        Section::Tagline,
        Section::LogoUrl,
        Section::ContactEmail,
        Section::ContactPhone,
        Section::HeroSlides,
        Section::Services,
        Section::About,
        Section::Navigation,
        Section::Footer,
        Section::Seo,
        Section::Map,
        Section::Testimonials,
        Section::Gallery,
    ];

    /// Document key for this section
    pub fn key(self) -> &'static str {
        match self {
            Section::SiteName => "siteName",
            Section::Tagline => "tagline",
            Section::LogoUrl => "logoUrl",
            Section::ContactEmail => "contactEmail",
            Section::ContactPhone => "contactPhone",
            Section::HeroSlides => "heroSlides",
            Section::Services => "services",
            Section::About => "about",
            Section::Navigation => "navigation",
            Section::Footer => "footer",
            Section::Seo => "seo",
            Section::Map => "map",
            Section::Testimonials => "testimonials",
            Section::Gallery => "gallery",
        }
    }

    /// JSON kind a replacement value must have
    fn expected(self) -> &'static str {
        match self {
            Section::SiteName
            | Section::Tagline
            | Section::LogoUrl
            | Section::ContactEmail
            | Section::ContactPhone => "a string",
            Section::HeroSlides | Section::Services | Section::Testimonials | Section::Gallery => {
                "a list"
            }
            Section::About | Section::Navigation | Section::Footer | Section::Seo | Section::Map => {
                "an object"
            }
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self.expected() {
            "a string" => value.is_string(),
            "a list" => value.is_array(),
            _ => value.is_object(),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Section {
    type Err = SectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Section::ALL
            .into_iter()
            .find(|section| section.key() == s)
            .ok_or_else(|| SectionError::Unknown(s.to_string()))
    }
}

impl SiteConfig {
    /// Wrap a stored document as-is.
    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    pub fn as_document(&self) -> &Document {
        &self.doc
    }

    /// Copy out the stored document form.
    pub fn to_document(&self) -> Document {
        self.doc.clone()
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Raw value of any top-level key, known or not
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    pub fn section(&self, section: Section) -> Option<&Value> {
        self.doc.get(section.key())
    }

    /// String value of a section, or `""` if it is missing or not a string.
    pub fn text(&self, section: Section) -> &str {
        self.section(section).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn site_name(&self) -> &str {
        self.text(Section::SiteName)
    }

    pub fn tagline(&self) -> &str {
        self.text(Section::Tagline)
    }

    /// Decode a typed view of one section.
    ///
    /// Read-only: fields the view does not declare are skipped here but
    /// remain in the document.
    pub fn section_as<T: DeserializeOwned>(&self, section: Section) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.section(section).cloned().unwrap_or(Value::Null))
    }

    /// Set a top-level key in place.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.doc.insert(key.into(), value);
    }

    /// Shallow-merge `overlay` over this config.
    ///
    /// Each top-level key in `overlay` replaces the corresponding key here
    /// entirely; nested objects and lists are copied through verbatim.
    /// `null` values are treated as absent.
    pub fn overlay(&self, overlay: &Document) -> SiteConfig {
        let mut merged = self.doc.clone();
        for (key, value) in overlay {
            if !value.is_null() {
                merged.insert(key.clone(), value.clone());
            }
        }
        SiteConfig::from_document(merged)
    }

    /// Replace one section with a raw JSON value, returning the new config.
    ///
    /// Only the JSON kind is checked (string, list or object); the value is
    /// stored exactly as given.
    pub fn with_section(&self, section: Section, value: Value) -> Result<SiteConfig, SectionError> {
        if !section.accepts(&value) {
            return Err(SectionError::Invalid {
                section,
                expected: section.expected(),
            });
        }
        let mut next = self.clone();
        next.set(section.key(), value);
        Ok(next)
    }
}

impl From<Document> for SiteConfig {
    fn from(doc: Document) -> Self {
        Self::from_document(doc)
    }
}

/// `{...defaults, ...overlay}`
pub fn merge_over_defaults(overlay: &Document) -> SiteConfig {
    SiteConfig::default().overlay(overlay)
}
