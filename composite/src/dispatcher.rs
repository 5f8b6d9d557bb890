use crate::channels::{IntentPublisher, Payload, WriteIntent};
use crate::errors::Result;
use crate::types::{
    Comment, Image, Post, PostAggregate, PostId, Reaction, ResourceKind, validate_post_id,
};
use std::sync::Arc;

/// Turns aggregate writes into per-resource write intents.
///
/// The critical record's intent is always published first. Sub-resource
/// intents follow in the caller's list order within each collection. Nothing
/// here waits for a record service to apply anything.
///
/// Publishing is not atomic across channels. If a channel is full,
/// `create_aggregate` fails with `EnqueueFailed` after the intents before it
/// were already published, so a retried create may repeat them.
#[derive(Clone)]
pub struct WriteDispatcher {
    publisher: Arc<dyn IntentPublisher>,
}

impl WriteDispatcher {
    pub fn new(publisher: Arc<dyn IntentPublisher>) -> Self {
        Self { publisher }
    }

    pub async fn create_aggregate(&self, body: PostAggregate) -> Result<()> {
        validate_post_id(body.post_id)?;
        let post_id = body.post_id;
        tracing::debug!(post_id, "Creating composite entities");

        let post = Post {
            post_id,
            type_of_post: body.type_of_post,
            post_caption: body.post_caption,
            posted_on: body.posted_on,
            service_address: None,
        };
        self.publisher
            .publish(WriteIntent::create(Payload::Post(post)))
            .await?;

        for r in body.reactions {
            let reaction = Reaction {
                post_id,
                reaction_id: r.reaction_id,
                type_of_reaction: r.type_of_reaction,
                service_address: None,
            };
            self.publisher
                .publish(WriteIntent::create(Payload::Reaction(reaction)))
                .await?;
        }

        for c in body.comments {
            let comment = Comment {
                post_id,
                comment_id: c.comment_id,
                comment_text: c.comment_text,
                comment_date: c.comment_date,
                service_address: None,
            };
            self.publisher
                .publish(WriteIntent::create(Payload::Comment(comment)))
                .await?;
        }

        for i in body.images {
            let image = Image {
                post_id,
                image_id: i.image_id,
                image_url: i.image_url,
                upload_date: i.upload_date,
                service_address: None,
            };
            self.publisher
                .publish(WriteIntent::create(Payload::Image(image)))
                .await?;
        }

        tracing::debug!(post_id, "Composite entities dispatched");
        Ok(())
    }

    /// Publishes one delete-all intent per resource. The key is not checked:
    /// deleting an aggregate that does not exist, or could never exist, is
    /// not an error.
    pub async fn delete_aggregate(&self, post_id: PostId) -> Result<()> {
        tracing::debug!(post_id, "Deleting composite entities");

        for kind in ResourceKind::ALL {
            self.publisher
                .publish(WriteIntent::delete(kind, post_id))
                .await?;
        }
        Ok(())
    }
}
