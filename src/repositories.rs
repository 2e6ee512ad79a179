use crate::{
    domain::{CommentRepository, LikeRepository, MemeRepository},
    errors::RepoError,
    models::{Comment, Like, MediaType, Meme, NewMeme},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{AttributeValue, DeleteRequest, Select, WriteRequest},
    Client as DynamoDbClient,
};
use aws_smithy_types::error::operation::BuildError;
use std::collections::HashMap;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

type Item = HashMap<String, AttributeValue>;

// BatchWriteItem accepts at most 25 requests per call.
const BATCH_WRITE_LIMIT: usize = 25;

/// Scans a whole table, following pagination. `filter` is an optional
/// (FilterExpression, values) pair.
async fn scan_all(
    client: &DynamoDbClient,
    table_name: &str,
    filter: Option<(&str, Item)>,
) -> anyhow::Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut last_evaluated_key: Option<Item> = None;

    loop {
        let mut request_builder = client.scan().table_name(table_name);
        if let Some((expression, values)) = &filter {
            request_builder = request_builder
                .filter_expression(*expression)
                .set_expression_attribute_values(Some(values.clone()));
        }
        // Apply ExclusiveStartKey if paginating from previous response
        if let Some(lek) = last_evaluated_key {
            request_builder = request_builder.set_exclusive_start_key(Some(lek));
        }

        let resp = request_builder
            .send()
            .await
            .context(format!("DynamoDB: Failed to scan table '{}'", table_name))?;

        if let Some(page) = resp.items {
            tracing::debug!("DynamoDB Scan (table: {}): Returned {} items", table_name, page.len());
            items.extend(page);
        }

        last_evaluated_key = resp.last_evaluated_key;
        if last_evaluated_key.is_none() {
            break;
        }
    }

    Ok(items)
}

fn format_timestamp(ts: OffsetDateTime) -> anyhow::Result<String> {
    ts.format(&Rfc3339).context("Failed to format timestamp")
}

fn get_s<'a>(item: &'a Item, name: &str) -> Option<&'a String> {
    item.get(name)?.as_s().ok()
}

fn get_id(item: &Item, name: &str) -> Option<Uuid> {
    get_s(item, name).and_then(|s| Uuid::parse_str(s).ok())
}

fn get_timestamp(item: &Item, name: &str) -> Option<OffsetDateTime> {
    get_s(item, name).and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
}

fn item_to_meme(item: &Item) -> Option<Meme> {
    Some(Meme {
        id: get_id(item, "meme_id")?,
        title: get_s(item, "title").cloned(),
        media_url: get_s(item, "media_url")?.clone(),
        media_type: MediaType::parse(get_s(item, "media_type")?)?,
        created_at: get_timestamp(item, "created_at")?,
        likes_count: item.get("likes_count")?.as_n().ok()?.parse().ok()?,
    })
}

fn item_to_comment(item: &Item) -> Option<Comment> {
    Some(Comment {
        id: get_id(item, "comment_id")?,
        meme_id: get_id(item, "meme_id")?,
        content: get_s(item, "content")?.clone(),
        created_at: get_timestamp(item, "created_at")?,
    })
}

/// Parses every item or fails on the first corrupt one.
fn parse_all<T>(items: Vec<Item>, table_name: &str, key: &str, parse: fn(&Item) -> Option<T>) -> Result<Vec<T>, RepoError> {
    items
        .iter()
        .map(|item| {
            parse(item).ok_or_else(|| {
                let item_id = get_s(item, key);
                tracing::error!(item.id = ?item_id, table_name = %table_name, "DynamoDB: Failed to parse item");
                RepoError::DataCorruption(format!(
                    "DynamoDB: Failed to parse item {:?} of table '{}'",
                    item_id, table_name
                ))
            })
        })
        .collect()
}

fn delete_request(key_name: &str, key: String) -> Result<WriteRequest, BuildError> {
    let delete = DeleteRequest::builder()
        .key(key_name, AttributeValue::S(key))
        .build()?;
    Ok(WriteRequest::builder().delete_request(delete).build())
}

#[derive(Debug, Clone)]
pub struct DynamoDbMemeRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbMemeRepository {
    /// Creates a new repository instance configured for a specific table.
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbMemeRepository");
        Self { client, table_name }
    }

    async fn batch_delete(&self, ids: Vec<String>) -> anyhow::Result<()> {
        for chunk in ids.chunks(BATCH_WRITE_LIMIT) {
            let mut requests = chunk
                .iter()
                .map(|id| delete_request("meme_id", id.clone()))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to build delete request")?;

            // Unprocessed requests are sent again until DynamoDB has taken all of them.
            while !requests.is_empty() {
                let resp = self
                    .client
                    .batch_write_item()
                    .request_items(&self.table_name, requests)
                    .send()
                    .await
                    .context(format!("DynamoDB (table: {}): Failed to batch delete memes", self.table_name))?;
                requests = resp
                    .unprocessed_items
                    .and_then(|mut unprocessed| unprocessed.remove(&self.table_name))
                    .unwrap_or_default();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MemeRepository for DynamoDbMemeRepository {
    /// Scans the table and orders the memes by `created_at`, newest first.
    async fn list_newest_first(&self) -> Result<Vec<Meme>, RepoError> {
        let items = scan_all(&self.client, &self.table_name, None).await?;
        let mut memes = parse_all(items, &self.table_name, "meme_id", item_to_meme)?;
        memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        info!("DynamoDB (table: {}): Successfully listed {} memes", self.table_name, memes.len());
        Ok(memes)
    }

    // DynamoDB's `contains` is case-sensitive, so the match happens here.
    async fn list_with_media_url_like(&self, pattern: &str) -> Result<Vec<Meme>, RepoError> {
        let pattern = pattern.to_lowercase();
        let memes = self.list_newest_first().await?;
        Ok(memes
            .into_iter()
            .filter(|m| m.media_url.to_lowercase().contains(&pattern))
            .collect())
    }

    async fn insert(&self, meme: NewMeme) -> Result<Meme, RepoError> {
        let created = Meme {
            id: Uuid::new_v4(),
            title: meme.title,
            media_url: meme.media_url,
            media_type: meme.media_type,
            created_at: OffsetDateTime::now_utc(),
            likes_count: 0,
        };

        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("meme_id", AttributeValue::S(created.id.to_string()))
            .item("media_url", AttributeValue::S(created.media_url.clone()))
            .item("media_type", AttributeValue::S(created.media_type.as_str().to_string()))
            .item("created_at", AttributeValue::S(format_timestamp(created.created_at)?))
            .item("likes_count", AttributeValue::N("0".to_string()));
        if let Some(title) = &created.title {
            request = request.item("title", AttributeValue::S(title.clone()));
        }

        request
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put meme (id: {})", self.table_name, created.id))
            .map_err(RepoError::BackendError)?;
        Ok(created)
    }

    async fn set_likes_count(&self, id: Uuid, likes_count: u64) -> Result<(), RepoError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("meme_id", AttributeValue::S(id.to_string()))
            .update_expression("SET likes_count = :likes")
            .condition_expression("attribute_exists(meme_id)")
            .expression_attribute_values(":likes", AttributeValue::N(likes_count.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_conditional_check_failed_exception() => {
                tracing::warn!(meme_id = %id, "DynamoDB: likes_count update on a missing meme");
                Err(RepoError::NotFound(id))
            }
            Err(e) => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                "DynamoDB (table: {}): Failed to update likes of meme (id: {})",
                self.table_name, id
            )))),
        }
    }

    /// Deletes an item from DynamoDB using DeleteItem.
    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let id_str = id.to_string();
        tracing::debug!(meme_id = %id_str, table_name = %self.table_name, "DynamoDB: Deleting item");

        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("meme_id", AttributeValue::S(id_str.clone()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to delete meme (id: {})", self.table_name, id_str))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<usize, RepoError> {
        let items = scan_all(&self.client, &self.table_name, None).await?;
        let ids: Vec<String> = items
            .iter()
            .filter_map(|item| get_s(item, "meme_id").cloned())
            .collect();
        let removed = ids.len();
        self.batch_delete(ids).await?;
        info!("DynamoDB (table: {}): Deleted {} memes", self.table_name, removed);
        Ok(removed)
    }
}

#[derive(Debug, Clone)]
pub struct DynamoDbCommentRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbCommentRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbCommentRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl CommentRepository for DynamoDbCommentRepository {
    async fn list_for_meme(&self, meme_id: Uuid) -> Result<Vec<Comment>, RepoError> {
        let values = HashMap::from([(":meme".to_string(), AttributeValue::S(meme_id.to_string()))]);
        let items = scan_all(&self.client, &self.table_name, Some(("meme_id = :meme", values))).await?;
        let mut comments = parse_all(items, &self.table_name, "comment_id", item_to_comment)?;
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    async fn insert(&self, meme_id: Uuid, content: String) -> Result<Comment, RepoError> {
        let comment = Comment {
            id: Uuid::new_v4(),
            meme_id,
            content,
            created_at: OffsetDateTime::now_utc(),
        };

        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("comment_id", AttributeValue::S(comment.id.to_string()))
            .item("meme_id", AttributeValue::S(meme_id.to_string()))
            .item("content", AttributeValue::S(comment.content.clone()))
            .item("created_at", AttributeValue::S(format_timestamp(comment.created_at)?))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put comment on meme (id: {})", self.table_name, meme_id))
            .map_err(RepoError::BackendError)?;
        Ok(comment)
    }
}

#[derive(Debug, Clone)]
pub struct DynamoDbLikeRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbLikeRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbLikeRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl LikeRepository for DynamoDbLikeRepository {
    async fn insert(&self, meme_id: Uuid) -> Result<Like, RepoError> {
        let like = Like {
            id: Uuid::new_v4(),
            meme_id,
            created_at: OffsetDateTime::now_utc(),
        };

        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("like_id", AttributeValue::S(like.id.to_string()))
            .item("meme_id", AttributeValue::S(meme_id.to_string()))
            .item("created_at", AttributeValue::S(format_timestamp(like.created_at)?))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put like on meme (id: {})", self.table_name, meme_id))
            .map_err(RepoError::BackendError)?;
        Ok(like)
    }

    async fn count_for_meme(&self, meme_id: Uuid) -> Result<u64, RepoError> {
        let mut total: u64 = 0;
        let mut last_evaluated_key: Option<Item> = None;

        loop {
            let resp = self
                .client
                .scan()
                .table_name(&self.table_name)
                .select(Select::Count)
                .filter_expression("meme_id = :meme")
                .expression_attribute_values(":meme", AttributeValue::S(meme_id.to_string()))
                .set_exclusive_start_key(last_evaluated_key)
                .send()
                .await
                .context(format!("DynamoDB (table: {}): Failed to count likes of meme (id: {})", self.table_name, meme_id))
                .map_err(RepoError::BackendError)?;

            total += resp.count.max(0) as u64;
            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meme_item() -> Item {
        HashMap::from([
            ("meme_id".to_string(), AttributeValue::S("6f1c1a5e-2a4b-4a52-9a38-3d6d1f0c8e11".into())),
            ("media_url".to_string(), AttributeValue::S("https://example.com/cat.jpg".into())),
            ("media_type".to_string(), AttributeValue::S("image".into())),
            ("created_at".to_string(), AttributeValue::S("2024-05-01T12:00:00Z".into())),
            ("likes_count".to_string(), AttributeValue::N("4".into())),
        ])
    }

    #[test]
    fn parses_meme_items_without_title() {
        let meme = item_to_meme(&meme_item()).expect("valid item");
        assert_eq!(meme.title, None);
        assert_eq!(meme.likes_count, 4);
        assert_eq!(meme.media_type, MediaType::Image);
    }

    #[test]
    fn corrupt_items_are_reported() {
        let mut item = meme_item();
        item.insert("media_type".into(), AttributeValue::S("gif".into()));
        let err = parse_all(vec![item], "memes", "meme_id", item_to_meme).unwrap_err();
        assert!(matches!(err, RepoError::DataCorruption(_)));
    }
}
