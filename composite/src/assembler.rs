use crate::types::{
    Comment, CommentSummary, Image, ImageSummary, Post, PostAggregate, Reaction, ReactionSummary,
    ServiceAddresses, SubRecord,
};

/// Builds the externally visible aggregate from the raw downstream results.
///
/// Provenance takes the address of the post record and of the first element
/// of each collection. An empty collection yields an empty address.
pub fn assemble(
    post: Post,
    reactions: Vec<Reaction>,
    comments: Vec<Comment>,
    images: Vec<Image>,
    cmp_address: &str,
) -> PostAggregate {
    let service_addresses = ServiceAddresses {
        cmp: cmp_address.to_string(),
        post: post.service_address.clone().unwrap_or_default(),
        reaction: first_address(&reactions),
        comment: first_address(&comments),
        image: first_address(&images),
    };

    PostAggregate {
        post_id: post.post_id,
        type_of_post: post.type_of_post,
        post_caption: post.post_caption,
        posted_on: post.posted_on,
        reactions: reactions
            .into_iter()
            .map(|r| ReactionSummary {
                reaction_id: r.reaction_id,
                type_of_reaction: r.type_of_reaction,
            })
            .collect(),
        comments: comments
            .into_iter()
            .map(|c| CommentSummary {
                comment_id: c.comment_id,
                comment_text: c.comment_text,
                comment_date: c.comment_date,
            })
            .collect(),
        images: images
            .into_iter()
            .map(|i| ImageSummary {
                image_id: i.image_id,
                image_url: i.image_url,
                upload_date: i.upload_date,
            })
            .collect(),
        service_addresses: Some(service_addresses),
    }
}

fn first_address<T: SubRecord>(records: &[T]) -> String {
    records
        .first()
        .and_then(|r| r.service_address())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn post() -> Post {
        Post {
            post_id: 1,
            type_of_post: "reel".into(),
            post_caption: "fun".into(),
            posted_on: NaiveDate::from_ymd_opt(2023, 7, 17),
            service_address: Some("post-0/10.0.0.4:8080".into()),
        }
    }

    fn reaction(reaction_id: i64, address: &str) -> Reaction {
        Reaction {
            post_id: 1,
            reaction_id,
            type_of_reaction: "heart".into(),
            service_address: Some(address.into()),
        }
    }

    #[test]
    fn test_provenance_from_first_element() {
        let aggregate = assemble(
            post(),
            vec![reaction(1, "reaction-0"), reaction(2, "reaction-1")],
            vec![],
            vec![],
            "cmp-0:7000",
        );

        let addresses = aggregate.service_addresses.unwrap();
        assert_eq!(addresses.cmp, "cmp-0:7000");
        assert_eq!(addresses.post, "post-0/10.0.0.4:8080");
        assert_eq!(addresses.reaction, "reaction-0");
        assert_eq!(addresses.comment, "");
        assert_eq!(addresses.image, "");
    }

    #[test]
    fn test_fields_are_mapped() {
        let image = Image {
            post_id: 1,
            image_id: 5,
            image_url: "http://img/5".into(),
            upload_date: None,
            service_address: None,
        };
        let comment = Comment {
            post_id: 1,
            comment_id: 3,
            comment_text: "nice".into(),
            comment_date: NaiveDate::from_ymd_opt(2023, 7, 18),
            service_address: Some("comment-0".into()),
        };

        let aggregate = assemble(post(), vec![reaction(1, "r")], vec![comment], vec![image], "");

        assert_eq!(aggregate.post_id, 1);
        assert_eq!(aggregate.type_of_post, "reel");
        assert_eq!(aggregate.posted_on, NaiveDate::from_ymd_opt(2023, 7, 17));
        assert_eq!(
            aggregate.reactions,
            vec![ReactionSummary {
                reaction_id: 1,
                type_of_reaction: "heart".into()
            }]
        );
        assert_eq!(aggregate.comments[0].comment_text, "nice");
        assert_eq!(aggregate.images[0].image_url, "http://img/5");
        // A record without an address contributes an empty one
        assert_eq!(aggregate.service_addresses.unwrap().image, "");
    }

    #[test]
    fn test_aggregate_json_shape() {
        let aggregate = assemble(post(), vec![], vec![], vec![], "cmp");
        let json = serde_json::to_value(&aggregate).unwrap();

        assert_eq!(json["postId"], 1);
        assert_eq!(json["postedOn"], "2023-07-17");
        assert_eq!(json["reactions"], serde_json::json!([]));
        assert_eq!(json["serviceAddresses"]["post"], "post-0/10.0.0.4:8080");
        assert_eq!(json["serviceAddresses"]["comment"], "");
    }
}
