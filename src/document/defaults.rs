//! Compiled-in default document. Every field is populated so it can serve as
//! the base layer of every merge and as the last-resort fallback.

use serde_json::{json, Value};

use super::{Document, SiteConfig};

fn link(id: &str, label: &str, href: &str) -> Value {
    json!({ "id": id, "label": label, "href": href })
}

impl Default for SiteConfig {
    fn default() -> Self {
        let doc = json!({
            "siteName": "Your Business",
            "tagline": "Professional services you can rely on",
            "logoUrl": "/images/logo.svg",
            "contactEmail": "hello@example.com",
            "contactPhone": "+1 555 0100",
            "heroSlides": [{
                "id": "slide-1",
                "title": "Welcome",
                "subtitle": "Quality work, delivered on time",
                "imageUrl": "/images/hero-1.jpg",
                "ctaLabel": "Get a quote",
                "ctaHref": "/contact"
            }],
            "services": [{
                "id": "service-1",
                "title": "Consultation",
                "description": "Tell us what you need and we will plan it with you.",
                "icon": "chat",
                "price": null
            }],
            "about": {
                "heading": "About us",
                "body": "We are a small team serving our community.",
                "imageUrl": "/images/about.jpg",
                "highlights": ["Licensed & insured"]
            },
            "navigation": {
                "main": [
                    link("nav-home", "Home", "/"),
                    link("nav-services", "Services", "/services"),
                    link("nav-blog", "Blog", "/blog"),
                    link("nav-shop", "Shop", "/shop"),
                    link("nav-contact", "Contact", "/contact")
                ],
                "legal": [
                    link("legal-privacy", "Privacy Policy", "/privacy"),
                    link("legal-terms", "Terms of Service", "/terms")
                ]
            },
            "footer": {
                "text": "Serving the region since 2010.",
                "copyright": "All rights reserved.",
                "social": [{
                    "id": "social-facebook",
                    "platform": "facebook",
                    "url": "https://facebook.com/"
                }]
            },
            "seo": {
                "title": "Your Business",
                "description": "Professional services you can rely on.",
                "keywords": ["services"],
                "ogImageUrl": "/images/og.jpg"
            },
            "map": {
                "lat": 51.5074,
                "lng": -0.1278,
                "zoom": 14,
                "address": "1 Main Street"
            },
            "testimonials": [{
                "id": "testimonial-1",
                "author": "A happy customer",
                "role": "Customer",
                "quote": "Fantastic service from start to finish.",
                "rating": 5,
                "avatarUrl": ""
            }],
            "gallery": [{
                "id": "gallery-1",
                "imageUrl": "/images/gallery-1.jpg",
                "caption": "Recent project"
            }]
        });

        match doc {
            Value::Object(map) => SiteConfig::from_document(map),
            _ => SiteConfig::from_document(Document::new()),
        }
    }
}
