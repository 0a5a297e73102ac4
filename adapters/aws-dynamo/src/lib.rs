//! DynamoDB adapter implementing the `MemberStore` and `GroupStore` ports.
//!
//! Backed by `aws-sdk-dynamodb`:
//! - Members live in the Users table, groups in the Groups table; both are
//!   keyed by `name`.
//! - A group item carries its full member list as a list of maps; appends go
//!   through a store-side `list_append` update so concurrent appends to the
//!   same group never lose entries.
//! - Provides `from_env()` wiring using env vars `DYNAMO_TABLE_USERS` and
//!   `DYNAMO_TABLE_GROUPS` (defaulting to `Users` / `Groups`).
//!
//! Notes:
//! - The domain ports are synchronous. We bridge to the async AWS SDK using
//!   an internal `tokio::runtime::Runtime` and `block_on`, or the current
//!   runtime when one already exists.
//! - Every SDK call runs with a bounded operation timeout; a timed-out call
//!   surfaces as `CoreError::Backend` like any other transient failure.

use std::collections::HashMap;
use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::{types::AttributeValue, Client};
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use domain::{CoreError, Group, GroupStore, Member, MemberStore};

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for DynamoDB table names.
#[derive(Clone, Debug)]
pub struct DynamoTables {
    pub users: String,
    pub groups: String,
}

impl DynamoTables {
    /// Create with explicit table names.
    pub fn new(users: impl Into<String>, groups: impl Into<String>) -> Self {
        Self {
            users: users.into(),
            groups: groups.into(),
        }
    }

    /// Build from environment variables, with the source table names as
    /// defaults.
    pub fn from_env() -> Self {
        let users = std::env::var("DYNAMO_TABLE_USERS").unwrap_or_else(|_| "Users".into());
        let groups = std::env::var("DYNAMO_TABLE_GROUPS").unwrap_or_else(|_| "Groups".into());
        Self { users, groups }
    }
}

/// Store backed by AWS DynamoDB.
///
/// Supports both standalone mode (creates its own Tokio runtime) and server
/// mode (reuses the existing runtime via `Handle::current()`).
#[derive(Clone)]
pub struct DynamoStore {
    table_users: String,
    table_groups: String,
    client: Client,
    // Optional runtime - None when constructed inside a runtime (reuses it)
    rt: Option<std::sync::Arc<tokio::runtime::Runtime>>,
}

impl DynamoStore {
    /// Create a new store from explicit table names and an AWS SDK client.
    ///
    /// If called from within a Tokio runtime, reuses the existing runtime.
    /// Otherwise creates a new runtime.
    pub fn with_client(tables: DynamoTables, client: Client) -> Result<Self, CoreError> {
        let rt = Self::maybe_create_runtime()?;
        Ok(Self {
            table_users: tables.users,
            table_groups: tables.groups,
            client,
            rt,
        })
    }

    /// Construct with table names but create a default AWS SDK client using
    /// env/IMDS, with a bounded per-operation timeout.
    pub fn new(tables: DynamoTables) -> Result<Self, CoreError> {
        let rt = Self::maybe_create_runtime()?;
        let timeouts = TimeoutConfig::builder()
            .operation_timeout(DEFAULT_OPERATION_TIMEOUT)
            .build();
        let conf = Self::block_on_with_rt(
            &rt,
            aws_config::defaults(aws_config::BehaviorVersion::latest())
                .timeout_config(timeouts)
                .load(),
        );
        let client = Client::new(&conf);
        Ok(Self {
            table_users: tables.users,
            table_groups: tables.groups,
            client,
            rt,
        })
    }

    /// Construct from environment variables:
    /// - `DYNAMO_TABLE_USERS` (optional, defaults to "Users")
    /// - `DYNAMO_TABLE_GROUPS` (optional, defaults to "Groups")
    pub fn from_env() -> Result<Self, CoreError> {
        Self::new(DynamoTables::from_env())
    }

    /// Check if we're inside a Tokio runtime. If yes, return None (reuse
    /// existing). If no, create a new runtime.
    fn maybe_create_runtime() -> Result<Option<std::sync::Arc<tokio::runtime::Runtime>>, CoreError>
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            Ok(None)
        } else {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|e| CoreError::Backend(format!("tokio runtime init: {e}")))?;
            Ok(Some(std::sync::Arc::new(rt)))
        }
    }

    /// Run an async future, using either our owned runtime or the current one.
    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        Self::block_on_with_rt(&self.rt, fut)
    }

    fn block_on_with_rt<F: std::future::Future>(
        rt: &Option<std::sync::Arc<tokio::runtime::Runtime>>,
        fut: F,
    ) -> F::Output {
        match rt {
            Some(rt) => rt.block_on(fut),
            None => {
                // Inside an existing runtime - use block_in_place + Handle::current()
                tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
            }
        }
    }

    /// Scan a table to exhaustion, following `last_evaluated_key` so callers
    /// see a single completed list.
    fn scan_table(&self, table: &str) -> Result<Vec<HashMap<String, AttributeValue>>, CoreError> {
        let table = table.to_string();
        let fut = async {
            let mut items = Vec::new();
            let mut start_key: Option<HashMap<String, AttributeValue>> = None;
            loop {
                let mut req = self.client.scan().table_name(table.clone());
                if let Some(key) = start_key.take() {
                    req = req.set_exclusive_start_key(Some(key));
                }
                let out = req.send().await?;
                items.extend_from_slice(out.items());
                match out.last_evaluated_key() {
                    Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                    _ => break,
                }
            }
            Ok::<_, SdkError<ScanError>>(items)
        };
        self.block_on(fut).map_err(map_sdk_err)
    }
}

impl MemberStore for DynamoStore {
    fn get(&self, name: &str) -> Result<Option<Member>, CoreError> {
        let table = self.table_users.clone();
        let key = name.to_string();
        let fut = async {
            self.client
                .get_item()
                .table_name(table)
                .key("name", AttributeValue::S(key))
                .send()
                .await
        };
        let out = self.block_on(fut).map_err(map_sdk_err)?;
        match out.item() {
            Some(item) => Ok(Some(item_to_member(item)?)),
            None => Ok(None),
        }
    }

    fn put(&self, member: &Member) -> Result<(), CoreError> {
        // Unconditional upsert: a duplicate name silently replaces the prior
        // record (last-write-wins).
        let table = self.table_users.clone();
        let item = member_to_item(member);
        let fut = async {
            self.client
                .put_item()
                .table_name(table)
                .set_item(Some(item))
                .send()
                .await
        };
        self.block_on(fut).map_err(map_sdk_err)?;
        Ok(())
    }

    fn scan_all(&self) -> Result<Vec<Member>, CoreError> {
        let items = self.scan_table(&self.table_users)?;
        items.iter().map(item_to_member).collect()
    }
}

impl GroupStore for DynamoStore {
    fn get(&self, name: &str) -> Result<Option<Group>, CoreError> {
        let table = self.table_groups.clone();
        let key = name.to_string();
        let fut = async {
            self.client
                .get_item()
                .table_name(table)
                .key("name", AttributeValue::S(key))
                .send()
                .await
        };
        let out = self.block_on(fut).map_err(map_sdk_err)?;
        match out.item() {
            Some(item) => Ok(Some(item_to_group(item)?)),
            None => Ok(None),
        }
    }

    fn put(&self, group: &Group) -> Result<(), CoreError> {
        let table = self.table_groups.clone();
        let item = group_to_item(group);
        let fut = async {
            self.client
                .put_item()
                .table_name(table)
                .set_item(Some(item))
                .send()
                .await
        };
        self.block_on(fut).map_err(map_sdk_err)?;
        Ok(())
    }

    fn append_members(&self, group_name: &str, members: &[Member]) -> Result<(), CoreError> {
        let table = self.table_groups.clone();
        let key = group_name.to_string();
        let new_entries = AttributeValue::L(
            members
                .iter()
                .map(|m| AttributeValue::M(member_to_item(m)))
                .collect(),
        );
        let fut = async {
            self.client
                .update_item()
                .table_name(table)
                .key("name", AttributeValue::S(key))
                .update_expression("SET #u = list_append(#u, :new)")
                .expression_attribute_names("#u", "users")
                .expression_attribute_names("#n", "name")
                .expression_attribute_values(":new", new_entries)
                .condition_expression("attribute_exists(#n)")
                .send()
                .await
        };
        self.block_on(fut).map_err(|e| match e.as_service_error() {
            Some(se) if se.code() == Some("ConditionalCheckFailedException") => CoreError::NotFound,
            _ => map_sdk_err(e),
        })?;
        Ok(())
    }

    fn scan_all(&self) -> Result<Vec<Group>, CoreError> {
        let items = self.scan_table(&self.table_groups)?;
        items.iter().map(item_to_group).collect()
    }
}

fn map_sdk_err<E: ProvideErrorMetadata + std::fmt::Display>(e: E) -> CoreError {
    if e.code() == Some("ResourceNotFoundException") {
        return CoreError::Backend("missing table".into());
    }
    CoreError::Backend(format!("dynamo error: {e}"))
}

fn get_s(item: &HashMap<String, AttributeValue>, field: &str) -> Result<String, CoreError> {
    item.get(field)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| CoreError::Malformed(format!("item missing {field}")))
}

fn member_to_item(member: &Member) -> HashMap<String, AttributeValue> {
    let mut m = HashMap::new();
    m.insert("name".into(), AttributeValue::S(member.name.clone()));
    m.insert("region".into(), AttributeValue::S(member.region.clone()));
    m.insert("email".into(), AttributeValue::S(member.email.clone()));
    m.insert("age".into(), AttributeValue::S(member.age.clone()));
    m.insert("group".into(), AttributeValue::S(member.group.clone()));
    m
}

fn item_to_member(item: &HashMap<String, AttributeValue>) -> Result<Member, CoreError> {
    Ok(Member {
        name: get_s(item, "name")?,
        region: get_s(item, "region")?,
        email: get_s(item, "email")?,
        age: get_s(item, "age")?,
        group: get_s(item, "group")?,
    })
}

fn group_to_item(group: &Group) -> HashMap<String, AttributeValue> {
    let mut m = HashMap::new();
    m.insert("name".into(), AttributeValue::S(group.name.clone()));
    m.insert("region".into(), AttributeValue::S(group.region.clone()));
    m.insert(
        "users".into(),
        AttributeValue::L(
            group
                .users
                .iter()
                .map(|u| AttributeValue::M(member_to_item(u)))
                .collect(),
        ),
    );
    m
}

fn item_to_group(item: &HashMap<String, AttributeValue>) -> Result<Group, CoreError> {
    let name = get_s(item, "name")?;
    let region = get_s(item, "region")?;
    // `users` is absent on items written before any member attached; decode
    // that as an empty list rather than failing.
    let users = match item.get("users") {
        Some(av) => {
            let list = av
                .as_l()
                .map_err(|_| CoreError::Malformed("group users is not a list".into()))?;
            list.iter()
                .map(|entry| {
                    let m = entry
                        .as_m()
                        .map_err(|_| CoreError::Malformed("group user entry is not a map".into()))?;
                    item_to_member(m)
                })
                .collect::<Result<Vec<_>, _>>()?
        }
        None => Vec::new(),
    };
    Ok(Group {
        name,
        region,
        users,
    })
}
