//! Records exchanged with the downstream record services and the aggregate
//! shape returned to callers.
//!
//! Field names follow the JSON used on the wire (camelCase). Dates are plain
//! ISO calendar dates.

use crate::errors::CompositeError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a post aggregate. Supplied by callers, never generated here.
pub type PostId = i64;

/// Rejects keys that no downstream service would accept.
pub fn validate_post_id(post_id: PostId) -> Result<(), CompositeError> {
    if post_id < 1 {
        return Err(CompositeError::InvalidInput(format!("Invalid postId: {post_id}")));
    }
    Ok(())
}

/// The four record services the composite talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Post,
    Reaction,
    Comment,
    Image,
}

/// Whether an aggregate can exist without the resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DependencyClass {
    Critical,
    Optional,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Post,
        ResourceKind::Reaction,
        ResourceKind::Comment,
        ResourceKind::Image,
    ];

    pub const fn class(&self) -> DependencyClass {
        match self {
            ResourceKind::Post => DependencyClass::Critical,
            ResourceKind::Reaction | ResourceKind::Comment | ResourceKind::Image => {
                DependencyClass::Optional
            }
        }
    }

    /// Name of the outbound channel carrying write intents for this resource.
    pub const fn channel(&self) -> &'static str {
        match self {
            ResourceKind::Post => "output-posts",
            ResourceKind::Reaction => "output-reactions",
            ResourceKind::Comment => "output-comments",
            ResourceKind::Image => "output-images",
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Post => "post",
            ResourceKind::Reaction => "reaction",
            ResourceKind::Comment => "comment",
            ResourceKind::Image => "image",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub post_id: PostId,
    pub type_of_post: String,
    pub post_caption: String,
    #[serde(default)]
    pub posted_on: Option<NaiveDate>,
    #[serde(default)]
    pub service_address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub post_id: PostId,
    pub reaction_id: i64,
    pub type_of_reaction: String,
    #[serde(default)]
    pub service_address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub post_id: PostId,
    pub comment_id: i64,
    pub comment_text: String,
    #[serde(default)]
    pub comment_date: Option<NaiveDate>,
    #[serde(default)]
    pub service_address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub post_id: PostId,
    pub image_id: i64,
    pub image_url: String,
    #[serde(default)]
    pub upload_date: Option<NaiveDate>,
    #[serde(default)]
    pub service_address: Option<String>,
}

/// Common view over the optional sub-resource records.
pub trait SubRecord {
    const KIND: ResourceKind;

    fn service_address(&self) -> Option<&str>;
}

impl SubRecord for Reaction {
    const KIND: ResourceKind = ResourceKind::Reaction;

    fn service_address(&self) -> Option<&str> {
        self.service_address.as_deref()
    }
}

impl SubRecord for Comment {
    const KIND: ResourceKind = ResourceKind::Comment;

    fn service_address(&self) -> Option<&str> {
        self.service_address.as_deref()
    }
}

impl SubRecord for Image {
    const KIND: ResourceKind = ResourceKind::Image;

    fn service_address(&self) -> Option<&str> {
        self.service_address.as_deref()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    pub reaction_id: i64,
    pub type_of_reaction: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSummary {
    pub comment_id: i64,
    pub comment_text: String,
    #[serde(default)]
    pub comment_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub image_id: i64,
    pub image_url: String,
    #[serde(default)]
    pub upload_date: Option<NaiveDate>,
}

/// Which physical instance answered each part of an aggregate read.
/// Empty strings mean nothing answered for that resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceAddresses {
    pub cmp: String,
    pub post: String,
    pub reaction: String,
    pub comment: String,
    pub image: String,
}

/// A post together with its reactions, comments and images.
///
/// Used both as the body of a create request and as the assembled read
/// result. `service_addresses` is ignored on create.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAggregate {
    pub post_id: PostId,
    pub type_of_post: String,
    pub post_caption: String,
    #[serde(default)]
    pub posted_on: Option<NaiveDate>,
    #[serde(default)]
    pub reactions: Vec<ReactionSummary>,
    #[serde(default)]
    pub comments: Vec<CommentSummary>,
    #[serde(default)]
    pub images: Vec<ImageSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_addresses: Option<ServiceAddresses>,
}
