//! DynamoDB backend.
//!
//! Table schema:
//! - PK: `pk` (String), the collection key
//! - SK: `sk` (String), the member
//! - `skN` (Number): score, range key of the local secondary index `idx`
//!   (keys-only projection)
//! - `val`: payload (String, Number or Binary)
//!
//! All names come from [`TableConfig`].

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::transact_get_items::TransactGetItemsError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{
    AttributeValue, CancellationReason, ConditionCheck, Delete, Get, Put, ReturnValue,
    Select as DynamoSelect, TransactGetItem, TransactWriteItem, Update,
};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info};

use super::{
    Axis, Backend, Cursor, Query, QueryPage, ReturnValues, Select, WriteOp,
    MAX_TRANSACTION_ITEMS,
};
use crate::config::{DynamoConfig, TableConfig};
use crate::error::{Error, Result};
use crate::expression::{ExpressionBuilder, Placeholders};
use crate::item::{Attribute, Item, Key};
use crate::value::Value;

type AttributeMap = HashMap<String, AttributeValue>;

/// DynamoDB implementation of [`Backend`].
#[derive(Clone)]
pub struct DynamoBackend {
    client: Client,
    table: TableConfig,
}

impl DynamoBackend {
    /// Wrap an existing SDK client.
    pub fn new(client: Client, table: TableConfig) -> Self {
        Self { client, table }
    }

    /// Build a client from the ambient AWS configuration, honouring the
    /// endpoint and region overrides of `dynamo`.
    pub async fn connect(dynamo: &DynamoConfig, table: TableConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &dynamo.region {
            loader = loader.region(aws_sdk_dynamodb::config::Region::new(region.clone()));
        }
        let config = loader.load().await;

        let client = if let Some(endpoint) = &dynamo.endpoint_url {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&config)
        };

        info!(
            table = %table.name,
            index = %table.index,
            endpoint = dynamo.endpoint_url.as_deref().unwrap_or("default"),
            "Connected to DynamoDB"
        );

        Ok(Self::new(client, table))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn table(&self) -> &TableConfig {
        &self.table
    }

    fn key_map(&self, key: &Key) -> AttributeMap {
        let names = &self.table.attributes;
        HashMap::from([
            (
                names.partition_key.clone(),
                AttributeValue::S(key.partition.clone()),
            ),
            (names.sort_key.clone(), AttributeValue::S(key.sort.clone())),
        ])
    }

    fn item_map(&self, item: &Item) -> Result<AttributeMap> {
        let names = &self.table.attributes;
        let mut map = self.key_map(&item.key);
        if let Some(score) = item.score {
            map.insert(
                names.score.clone(),
                AttributeValue::N(Value::Float(score).number_string()?),
            );
        }
        if let Some(value) = &item.value {
            map.insert(names.value.clone(), to_attribute(value)?);
        }
        Ok(map)
    }

    fn parse_item(&self, map: &AttributeMap) -> Result<Item> {
        let names = &self.table.attributes;
        let string = |name: &str| match map.get(name) {
            Some(AttributeValue::S(s)) => Ok(s.clone()),
            other => Err(Error::Decode(format!(
                "attribute {name} is not a string: {other:?}"
            ))),
        };
        let key = Key::new(string(&names.partition_key)?, string(&names.sort_key)?);

        let score = match map.get(&names.score) {
            None => None,
            Some(AttributeValue::N(n)) => Some(
                n.parse::<f64>()
                    .map_err(|_| Error::Decode(format!("invalid score {n:?}")))?,
            ),
            Some(other) => {
                return Err(Error::Decode(format!("score is not a number: {other:?}")))
            }
        };
        let value = map.get(&names.value).map(from_attribute).transpose()?;

        Ok(Item { key, score, value })
    }

    fn parse_returned(&self, map: Option<AttributeMap>) -> Result<Option<Item>> {
        match map {
            Some(map) if !map.is_empty() => self.parse_item(&map).map(Some),
            _ => Ok(None),
        }
    }

    fn cursor_map(&self, cursor: &Cursor, axis: Axis) -> Result<AttributeMap> {
        let mut map = self.key_map(&cursor.key);
        if let (Axis::Score, Some(score)) = (axis, cursor.score) {
            map.insert(
                self.table.attributes.score.clone(),
                AttributeValue::N(Value::Float(score).number_string()?),
            );
        }
        Ok(map)
    }

    fn values_map(values: HashMap<String, Value>) -> Result<AttributeMap> {
        values
            .into_iter()
            .map(|(placeholder, value)| Ok((placeholder, to_attribute(&value)?)))
            .collect()
    }
}

fn to_attribute(value: &Value) -> Result<AttributeValue> {
    Ok(match value {
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Integer(_) | Value::Float(_) => AttributeValue::N(value.number_string()?),
        Value::Bytes(b) => AttributeValue::B(Blob::new(b.clone())),
    })
}

fn from_attribute(attribute: &AttributeValue) -> Result<Value> {
    match attribute {
        AttributeValue::S(s) => Ok(Value::String(s.clone())),
        AttributeValue::N(n) => Value::parse_number(n),
        AttributeValue::B(b) => Ok(Value::Bytes(b.as_ref().to_vec())),
        other => Err(Error::Decode(format!("unsupported attribute {other:?}"))),
    }
}

fn non_empty<V>(map: HashMap<String, V>) -> Option<HashMap<String, V>> {
    (!map.is_empty()).then_some(map)
}

fn build_error(e: impl std::fmt::Display) -> Error {
    Error::InvalidArgument(format!("invalid DynamoDB request: {e}"))
}

fn check_transaction_size(len: usize) -> Result<()> {
    if len > MAX_TRANSACTION_ITEMS {
        return Err(Error::InvalidArgument(format!(
            "transaction of {len} items exceeds the limit of {MAX_TRANSACTION_ITEMS}"
        )));
    }
    Ok(())
}

// ============================================================================
// Error classification
// ============================================================================

fn get_error(err: SdkError<GetItemError>) -> Error {
    Error::Transport(DisplayErrorContext(&err).to_string())
}

fn query_error(err: SdkError<QueryError>) -> Error {
    Error::Transport(DisplayErrorContext(&err).to_string())
}

fn put_error(err: SdkError<PutItemError>) -> Error {
    let context = DisplayErrorContext(&err).to_string();
    match err.into_service_error() {
        PutItemError::ConditionalCheckFailedException(_) => Error::ConditionFailed,
        PutItemError::TransactionConflictException(_) => Error::TransactionConflict(context),
        _ => Error::Transport(context),
    }
}

fn update_error(err: SdkError<UpdateItemError>) -> Error {
    let context = DisplayErrorContext(&err).to_string();
    match err.into_service_error() {
        UpdateItemError::ConditionalCheckFailedException(_) => Error::ConditionFailed,
        UpdateItemError::TransactionConflictException(_) => Error::TransactionConflict(context),
        _ => Error::Transport(context),
    }
}

fn delete_error(err: SdkError<DeleteItemError>) -> Error {
    let context = DisplayErrorContext(&err).to_string();
    match err.into_service_error() {
        DeleteItemError::ConditionalCheckFailedException(_) => Error::ConditionFailed,
        DeleteItemError::TransactionConflictException(_) => Error::TransactionConflict(context),
        _ => Error::Transport(context),
    }
}

/// A cancelled transaction is a condition failure when any item's condition
/// failed, a conflict when any item was contended, and a transport error
/// otherwise.
fn cancellation_error(reasons: &[CancellationReason], context: String) -> Error {
    let codes: Vec<&str> = reasons.iter().filter_map(|r| r.code()).collect();
    if codes.contains(&"ConditionalCheckFailed") {
        Error::ConditionFailed
    } else if codes.contains(&"TransactionConflict") {
        Error::TransactionConflict(context)
    } else {
        Error::Transport(context)
    }
}

fn transact_write_error(err: SdkError<TransactWriteItemsError>) -> Error {
    let context = DisplayErrorContext(&err).to_string();
    match err.into_service_error() {
        TransactWriteItemsError::TransactionCanceledException(e) => {
            cancellation_error(e.cancellation_reasons(), context)
        }
        TransactWriteItemsError::TransactionInProgressException(_) => {
            Error::TransactionConflict(context)
        }
        _ => Error::Transport(context),
    }
}

fn transact_get_error(err: SdkError<TransactGetItemsError>) -> Error {
    let context = DisplayErrorContext(&err).to_string();
    match err.into_service_error() {
        TransactGetItemsError::TransactionCanceledException(e) => {
            cancellation_error(e.cancellation_reasons(), context)
        }
        _ => Error::Transport(context),
    }
}

// ============================================================================
// Backend
// ============================================================================

#[async_trait]
impl Backend for DynamoBackend {
    async fn get_item(&self, key: &Key, consistent: bool) -> Result<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table.name)
            .set_key(Some(self.key_map(key)))
            .consistent_read(consistent)
            .send()
            .await
            .map_err(get_error)?;

        self.parse_returned(output.item)
    }

    async fn put_item(
        &self,
        item: Item,
        expression: &ExpressionBuilder,
        returns: ReturnValues,
    ) -> Result<Option<Item>> {
        let rendered = expression.render(&self.table.attributes)?;
        let return_value = match returns {
            ReturnValues::AllOld => ReturnValue::AllOld,
            ReturnValues::None | ReturnValues::AllNew => ReturnValue::None,
        };

        let output = self
            .client
            .put_item()
            .table_name(&self.table.name)
            .set_item(Some(self.item_map(&item)?))
            .set_condition_expression(rendered.condition)
            .set_expression_attribute_names(non_empty(rendered.names))
            .set_expression_attribute_values(non_empty(Self::values_map(rendered.values)?))
            .return_values(return_value)
            .send()
            .await
            .map_err(put_error)?;

        match returns {
            ReturnValues::None => Ok(None),
            ReturnValues::AllOld => self.parse_returned(output.attributes),
            // PutItem cannot return the new image; it is the item just written.
            ReturnValues::AllNew => Ok(Some(item)),
        }
    }

    async fn update_item(
        &self,
        key: &Key,
        expression: &ExpressionBuilder,
        returns: ReturnValues,
    ) -> Result<Option<Item>> {
        let rendered = expression.render(&self.table.attributes)?;
        let update = rendered
            .update
            .ok_or_else(|| Error::InvalidArgument("update without actions".into()))?;
        let return_value = match returns {
            ReturnValues::None => ReturnValue::None,
            ReturnValues::AllOld => ReturnValue::AllOld,
            ReturnValues::AllNew => ReturnValue::AllNew,
        };

        let output = self
            .client
            .update_item()
            .table_name(&self.table.name)
            .set_key(Some(self.key_map(key)))
            .update_expression(update)
            .set_condition_expression(rendered.condition)
            .set_expression_attribute_names(non_empty(rendered.names))
            .set_expression_attribute_values(non_empty(Self::values_map(rendered.values)?))
            .return_values(return_value)
            .send()
            .await
            .map_err(update_error)?;

        match returns {
            ReturnValues::None => Ok(None),
            _ => self.parse_returned(output.attributes),
        }
    }

    async fn delete_item(
        &self,
        key: &Key,
        expression: &ExpressionBuilder,
        returns: ReturnValues,
    ) -> Result<Option<Item>> {
        let rendered = expression.render(&self.table.attributes)?;
        let return_value = match returns {
            ReturnValues::AllOld => ReturnValue::AllOld,
            ReturnValues::None | ReturnValues::AllNew => ReturnValue::None,
        };

        let output = self
            .client
            .delete_item()
            .table_name(&self.table.name)
            .set_key(Some(self.key_map(key)))
            .set_condition_expression(rendered.condition)
            .set_expression_attribute_names(non_empty(rendered.names))
            .set_expression_attribute_values(non_empty(Self::values_map(rendered.values)?))
            .return_values(return_value)
            .send()
            .await
            .map_err(delete_error)?;

        match returns {
            ReturnValues::AllOld => self.parse_returned(output.attributes),
            _ => Ok(None),
        }
    }

    async fn query(&self, query: &Query) -> Result<QueryPage> {
        let names = &self.table.attributes;
        let axis = match query.axis {
            Axis::SortKey => Attribute::SortKey,
            Axis::Score => Attribute::Score,
        };

        let mut placeholders = Placeholders::default();
        let key_condition =
            placeholders.key_condition(&query.partition, axis, query.condition.as_ref(), names)?;

        let mut request = self
            .client
            .query()
            .table_name(&self.table.name)
            .key_condition_expression(key_condition)
            .scan_index_forward(query.forward)
            .consistent_read(query.consistent)
            .set_limit(
                query
                    .limit
                    .map(|limit| i32::try_from(limit.max(1)).unwrap_or(i32::MAX)),
            );

        if query.axis == Axis::Score {
            request = request.index_name(&self.table.index);
        }
        if let Some(cursor) = &query.cursor {
            request = request.set_exclusive_start_key(Some(self.cursor_map(cursor, query.axis)?));
        }

        request = match (query.select, query.axis) {
            (Select::Count, _) => request.select(DynamoSelect::Count),
            (Select::Items, _) => request.select(DynamoSelect::AllAttributes),
            (Select::Keys, Axis::Score) => request.select(DynamoSelect::AllProjectedAttributes),
            (Select::Keys, Axis::SortKey) => {
                let projection = [Attribute::PartitionKey, Attribute::SortKey, Attribute::Score]
                    .into_iter()
                    .map(|a| placeholders.name(a, names))
                    .collect::<Vec<_>>()
                    .join(", ");
                request.projection_expression(projection)
            }
        };

        let output = request
            .set_expression_attribute_names(non_empty(placeholders.names))
            .set_expression_attribute_values(non_empty(Self::values_map(placeholders.values)?))
            .send()
            .await
            .map_err(query_error)?;

        let items = output
            .items
            .unwrap_or_default()
            .iter()
            .map(|map| self.parse_item(map))
            .collect::<Result<Vec<_>>>()?;
        let count = usize::try_from(output.count).unwrap_or_default();
        let cursor = match output.last_evaluated_key {
            Some(map) if !map.is_empty() => {
                let last = self.parse_item(&map)?;
                Some(Cursor {
                    key: last.key,
                    score: last.score,
                })
            }
            _ => None,
        };

        debug!(
            partition = %query.partition,
            axis = ?query.axis,
            count,
            more = cursor.is_some(),
            "Fetched DynamoDB query page"
        );

        Ok(QueryPage {
            items,
            count,
            cursor,
        })
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<()> {
        check_transaction_size(ops.len())?;
        let names = &self.table.attributes;

        let mut transact_items = Vec::with_capacity(ops.len());
        for op in ops {
            let transact_item = match op {
                WriteOp::Put { item, expression } => {
                    let rendered = expression.render(names)?;
                    let put = Put::builder()
                        .table_name(&self.table.name)
                        .set_item(Some(self.item_map(&item)?))
                        .set_condition_expression(rendered.condition)
                        .set_expression_attribute_names(non_empty(rendered.names))
                        .set_expression_attribute_values(non_empty(Self::values_map(
                            rendered.values,
                        )?))
                        .build()
                        .map_err(build_error)?;
                    TransactWriteItem::builder().put(put).build()
                }
                WriteOp::Update { key, expression } => {
                    let rendered = expression.render(names)?;
                    let update = Update::builder()
                        .table_name(&self.table.name)
                        .set_key(Some(self.key_map(&key)))
                        .set_update_expression(rendered.update)
                        .set_condition_expression(rendered.condition)
                        .set_expression_attribute_names(non_empty(rendered.names))
                        .set_expression_attribute_values(non_empty(Self::values_map(
                            rendered.values,
                        )?))
                        .build()
                        .map_err(build_error)?;
                    TransactWriteItem::builder().update(update).build()
                }
                WriteOp::Delete { key, expression } => {
                    let rendered = expression.render(names)?;
                    let delete = Delete::builder()
                        .table_name(&self.table.name)
                        .set_key(Some(self.key_map(&key)))
                        .set_condition_expression(rendered.condition)
                        .set_expression_attribute_names(non_empty(rendered.names))
                        .set_expression_attribute_values(non_empty(Self::values_map(
                            rendered.values,
                        )?))
                        .build()
                        .map_err(build_error)?;
                    TransactWriteItem::builder().delete(delete).build()
                }
                WriteOp::ConditionCheck { key, expression } => {
                    let rendered = expression.render(names)?;
                    let check = ConditionCheck::builder()
                        .table_name(&self.table.name)
                        .set_key(Some(self.key_map(&key)))
                        .set_condition_expression(rendered.condition)
                        .set_expression_attribute_names(non_empty(rendered.names))
                        .set_expression_attribute_values(non_empty(Self::values_map(
                            rendered.values,
                        )?))
                        .build()
                        .map_err(build_error)?;
                    TransactWriteItem::builder().condition_check(check).build()
                }
            };
            transact_items.push(transact_item);
        }

        let len = transact_items.len();
        self.client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await
            .map_err(transact_write_error)?;

        debug!(items = len, "Committed DynamoDB transaction");
        Ok(())
    }

    async fn transact_get(&self, keys: &[Key]) -> Result<Vec<Option<Item>>> {
        check_transaction_size(keys.len())?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let transact_items = keys
            .iter()
            .map(|key| {
                let get = Get::builder()
                    .table_name(&self.table.name)
                    .set_key(Some(self.key_map(key)))
                    .build()
                    .map_err(build_error)?;
                Ok(TransactGetItem::builder().get(get).build())
            })
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .transact_get_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await
            .map_err(transact_get_error)?;

        let responses = output.responses.unwrap_or_default();
        if responses.len() != keys.len() {
            return Err(Error::Transport(format!(
                "expected {} transaction responses, got {}",
                keys.len(),
                responses.len()
            )));
        }
        responses
            .into_iter()
            .map(|response| self.parse_returned(response.item))
            .collect()
    }
}
