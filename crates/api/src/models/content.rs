//! Storefront content: banners, blog posts and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nutmart_core::text::{is_valid_slug, slugify};
use nutmart_core::{BannerId, BannerPosition, BlogId, BlogStatus, EventId, UserId};

use super::{
    ValidationError, nullable, optional_text, required_text, validate_link,
    validate_optional_link,
};

// =============================================================================
// Banners
// =============================================================================

/// A storefront banner.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Banner {
    pub id: BannerId,
    pub title: String,
    pub image_url: String,
    pub link_url: Option<String>,
    pub position: BannerPosition,
    pub sort_order: i32,
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Banner {
    /// Whether the banner shows on the storefront at `now`.
    #[must_use]
    pub fn is_displayed(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.starts_at.is_none_or(|start| start <= now)
            && self.ends_at.is_none_or(|end| now < end)
    }
}

/// Validated banner fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerDraft {
    pub title: String,
    pub image_url: String,
    pub link_url: Option<String>,
    pub position: BannerPosition,
    pub sort_order: i32,
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl BannerDraft {
    fn validate(self) -> Result<Self, ValidationError> {
        let title = required_text(&self.title, "title")?;
        let image_url = validate_link(&self.image_url, "image_url")?;
        let link_url = validate_optional_link(self.link_url, "link_url")?;
        if let (Some(start), Some(end)) = (self.starts_at, self.ends_at)
            && start >= end
        {
            return Err(ValidationError::new("starts_at must be before ends_at"));
        }
        Ok(Self {
            title,
            image_url,
            link_url,
            ..self
        })
    }
}

/// Banner creation form.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBanner {
    pub title: String,
    pub image_url: String,
    pub link_url: Option<String>,
    #[serde(default)]
    pub position: BannerPosition,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl NewBanner {
    /// Validate into a draft.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for blank titles, bad URLs or an empty window.
    pub fn into_draft(self) -> Result<BannerDraft, ValidationError> {
        BannerDraft {
            title: self.title,
            image_url: self.image_url,
            link_url: self.link_url,
            position: self.position,
            sort_order: self.sort_order,
            active: self.active,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
        }
        .validate()
    }
}

/// Partial banner update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BannerPatch {
    pub title: Option<String>,
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub link_url: Option<Option<String>>,
    pub position: Option<BannerPosition>,
    pub sort_order: Option<i32>,
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub starts_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub ends_at: Option<Option<DateTime<Utc>>>,
}

impl BannerPatch {
    /// Apply the patch to an existing banner.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the merged banner is invalid.
    pub fn apply(self, current: Banner) -> Result<BannerDraft, ValidationError> {
        BannerDraft {
            title: self.title.unwrap_or(current.title),
            image_url: self.image_url.unwrap_or(current.image_url),
            link_url: self.link_url.unwrap_or(current.link_url),
            position: self.position.unwrap_or(current.position),
            sort_order: self.sort_order.unwrap_or(current.sort_order),
            active: self.active.unwrap_or(current.active),
            starts_at: self.starts_at.unwrap_or(current.starts_at),
            ends_at: self.ends_at.unwrap_or(current.ends_at),
        }
        .validate()
    }
}

// =============================================================================
// Blogs
// =============================================================================

/// A blog post.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Blog {
    pub id: BlogId,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub cover_image_url: Option<String>,
    pub status: BlogStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A published post with its markdown rendered.
#[derive(Debug, Clone, Serialize)]
pub struct BlogPage {
    #[serde(flatten)]
    pub blog: Blog,
    pub content_html: String,
}

/// Validated blog fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogDraft {
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub cover_image_url: Option<String>,
    pub status: BlogStatus,
}

impl BlogDraft {
    fn validate(self) -> Result<Self, ValidationError> {
        let title = required_text(&self.title, "title")?;
        let slug = self.slug.trim().to_owned();
        if !is_valid_slug(&slug) {
            return Err(ValidationError::new(
                "slug must be lowercase letters, digits and single dashes",
            ));
        }
        let cover_image_url = validate_optional_link(self.cover_image_url, "cover_image_url")?;
        Ok(Self {
            title,
            slug,
            excerpt: self.excerpt.trim().to_owned(),
            cover_image_url,
            ..self
        })
    }
}

/// Blog creation form. The slug is derived from the title when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBlog {
    pub title: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub content: String,
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub status: BlogStatus,
}

impl NewBlog {
    /// Validate into a draft.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank title or invalid slug.
    pub fn into_draft(self) -> Result<BlogDraft, ValidationError> {
        let slug = optional_text(self.slug).unwrap_or_else(|| slugify(&self.title));
        BlogDraft {
            title: self.title,
            slug,
            excerpt: self.excerpt,
            content: self.content,
            cover_image_url: self.cover_image_url,
            status: self.status,
        }
        .validate()
    }
}

/// Partial blog update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlogPatch {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub cover_image_url: Option<Option<String>>,
    pub status: Option<BlogStatus>,
}

impl BlogPatch {
    /// Apply the patch to an existing post.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the merged post is invalid.
    pub fn apply(self, current: Blog) -> Result<BlogDraft, ValidationError> {
        BlogDraft {
            title: self.title.unwrap_or(current.title),
            slug: self.slug.unwrap_or(current.slug),
            excerpt: self.excerpt.unwrap_or(current.excerpt),
            content: self.content.unwrap_or(current.content),
            cover_image_url: self.cover_image_url.unwrap_or(current.cover_image_url),
            status: self.status.unwrap_or(current.status),
        }
        .validate()
    }
}

// =============================================================================
// Events
// =============================================================================

/// A store event (tasting, fair, promotion day).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub location: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated event fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub location: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub active: bool,
}

impl EventDraft {
    fn validate(self) -> Result<Self, ValidationError> {
        let title = required_text(&self.title, "title")?;
        if self.starts_at >= self.ends_at {
            return Err(ValidationError::new("starts_at must be before ends_at"));
        }
        let image_url = validate_optional_link(self.image_url, "image_url")?;
        Ok(Self {
            title,
            image_url,
            location: self.location.trim().to_owned(),
            ..self
        })
    }
}

/// Event creation form.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub location: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl NewEvent {
    /// Validate into a draft.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank title or an empty time window.
    pub fn into_draft(self) -> Result<EventDraft, ValidationError> {
        EventDraft {
            title: self.title,
            description: self.description,
            image_url: self.image_url,
            location: self.location,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            active: self.active,
        }
        .validate()
    }
}

/// Partial event update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
    pub location: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub active: Option<bool>,
}

impl EventPatch {
    /// Apply the patch to an existing event.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the merged event is invalid.
    pub fn apply(self, current: Event) -> Result<EventDraft, ValidationError> {
        EventDraft {
            title: self.title.unwrap_or(current.title),
            description: self.description.unwrap_or(current.description),
            image_url: self.image_url.unwrap_or(current.image_url),
            location: self.location.unwrap_or(current.location),
            starts_at: self.starts_at.unwrap_or(current.starts_at),
            ends_at: self.ends_at.unwrap_or(current.ends_at),
            active: self.active.unwrap_or(current.active),
        }
        .validate()
    }
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, day, 0, 0, 0).unwrap()
    }

    fn banner() -> Banner {
        Banner {
            id: BannerId::new(1),
            title: "Tết sum vầy".to_string(),
            image_url: "https://cdn.nutmart.vn/tet.jpg".to_string(),
            link_url: Some("/products?category=qua-tet".to_string()),
            position: BannerPosition::HomeHero,
            sort_order: 0,
            active: true,
            starts_at: Some(at(1)),
            ends_at: Some(at(20)),
            created_at: at(1),
            updated_at: at(1),
        }
    }

    #[test]
    fn test_banner_display_window() {
        let b = banner();
        assert!(!b.is_displayed(at(1) - Duration::seconds(1)));
        assert!(b.is_displayed(at(1)));
        assert!(b.is_displayed(at(19)));
        assert!(!b.is_displayed(at(20)));

        let mut inactive = banner();
        inactive.active = false;
        assert!(!inactive.is_displayed(at(10)));
    }

    #[test]
    fn test_banner_patch_clears_link_and_rejects_empty_window() {
        let patch: BannerPatch = serde_json::from_str(r#"{"link_url": null}"#).unwrap();
        let draft = patch.apply(banner()).unwrap();
        assert_eq!(draft.link_url, None);

        let patch = BannerPatch {
            ends_at: Some(Some(at(1))),
            ..BannerPatch::default()
        };
        assert!(patch.apply(banner()).is_err());
    }

    #[test]
    fn test_new_blog_derives_slug_from_title() {
        let blog: NewBlog =
            serde_json::from_str(r#"{"title": "Hạt điều rang muối: 5 cách bảo quản"}"#).unwrap();
        let draft = blog.into_draft().unwrap();
        assert_eq!(draft.slug, "hat-dieu-rang-muoi-5-cach-bao-quan");
        assert_eq!(draft.status, BlogStatus::Draft);
    }

    #[test]
    fn test_new_blog_rejects_bad_slug() {
        let blog: NewBlog =
            serde_json::from_str(r#"{"title": "Hạt óc chó", "slug": "Hat Oc Cho"}"#).unwrap();
        assert!(blog.into_draft().is_err());
    }

    #[test]
    fn test_event_requires_window() {
        let event = NewEvent {
            title: "Hội chợ nông sản".to_string(),
            description: String::new(),
            image_url: None,
            location: "Nhà Văn hóa Thanh Niên".to_string(),
            starts_at: at(5),
            ends_at: at(5),
            active: true,
        };
        assert_eq!(
            event.into_draft().unwrap_err().to_string(),
            "starts_at must be before ends_at"
        );
    }
}
