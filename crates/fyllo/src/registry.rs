//! Name-based construction of engines at startup.
//!
//! A [`Registry`] is a plain value mapping provider names to async factories,
//! one table per family. Each factory receives the provider's argument string
//! and builds a ready-to-use engine.

use core::fmt;
use std::sync::Arc;

use futures::{FutureExt, future::BoxFuture};

use crate::{
    Error, FixedIdentifier, MemStorage, RandomEngine, Result, SegmentEngine, SnowflakeEngine,
};

/// Builds an engine from a provider argument string.
pub type Factory<E> = Arc<dyn for<'a> Fn(&'a str) -> BoxFuture<'a, Result<E>> + Send + Sync>;

/// Provider name and argument string for one family.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: String,
    pub args: String,
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: args.into(),
        }
    }
}

/// One engine per family, as selected at startup.
#[derive(Debug)]
pub struct Providers {
    pub snowflake: SnowflakeEngine,
    pub segment: SegmentEngine,
    pub random: RandomEngine,
}

/// Provider tables for the snowflake, segment and random families.
///
/// [`Registry::default`] holds the built-in providers:
///
/// | family    | name      | arguments                                         |
/// |-----------|-----------|---------------------------------------------------|
/// | snowflake | `static`  | a machine id in `[0, 16)`                         |
/// | snowflake | `elected` | `endpoints=h:p,h:p[;user=..][;pwd=..][;ttl=secs]` |
/// | segment   | `mem`     | `tag=..,step=..[,max=..][,desc=..];...`           |
/// | segment   | `sql`     | PostgreSQL connection string                      |
/// | random    | `uuid`    | ignored                                           |
///
/// `elected` requires the `etcd` feature and `sql` the `postgres` feature.
///
/// # Example
///
/// ```
/// use fyllo::Registry;
///
/// # tokio_test();
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn tokio_test() {
/// let registry = Registry::default();
/// let engine = registry.build_snowflake("static", "1").await.unwrap();
/// assert_eq!(engine.machine_id(), 1);
///
/// let err = registry.build_random("v7", "").await.unwrap_err();
/// assert!(err.to_string().contains("uuid"));
/// # }
/// ```
#[derive(Clone)]
pub struct Registry {
    snowflake: Vec<(&'static str, Factory<SnowflakeEngine>)>,
    segment: Vec<(&'static str, Factory<SegmentEngine>)>,
    random: Vec<(&'static str, Factory<RandomEngine>)>,
}

impl Registry {
    /// A registry with no providers.
    pub fn empty() -> Self {
        Self {
            snowflake: Vec::new(),
            segment: Vec::new(),
            random: Vec::new(),
        }
    }

    /// Registers a snowflake provider, replacing any with the same name.
    pub fn register_snowflake<F>(&mut self, name: &'static str, factory: F) -> &mut Self
    where
        F: for<'a> Fn(&'a str) -> BoxFuture<'a, Result<SnowflakeEngine>> + Send + Sync + 'static,
    {
        insert(&mut self.snowflake, name, Arc::new(factory));
        self
    }

    /// Registers a segment provider, replacing any with the same name.
    pub fn register_segment<F>(&mut self, name: &'static str, factory: F) -> &mut Self
    where
        F: for<'a> Fn(&'a str) -> BoxFuture<'a, Result<SegmentEngine>> + Send + Sync + 'static,
    {
        insert(&mut self.segment, name, Arc::new(factory));
        self
    }

    /// Registers a random provider, replacing any with the same name.
    pub fn register_random<F>(&mut self, name: &'static str, factory: F) -> &mut Self
    where
        F: for<'a> Fn(&'a str) -> BoxFuture<'a, Result<RandomEngine>> + Send + Sync + 'static,
    {
        insert(&mut self.random, name, Arc::new(factory));
        self
    }

    pub fn snowflake_providers(&self) -> Vec<&'static str> {
        names(&self.snowflake)
    }

    pub fn segment_providers(&self) -> Vec<&'static str> {
        names(&self.segment)
    }

    pub fn random_providers(&self) -> Vec<&'static str> {
        names(&self.random)
    }

    pub async fn build_snowflake(&self, name: &str, args: &str) -> Result<SnowflakeEngine> {
        let factory = lookup("snowflake", &self.snowflake, name)?;
        factory(args).await
    }

    pub async fn build_segment(&self, name: &str, args: &str) -> Result<SegmentEngine> {
        let factory = lookup("segment", &self.segment, name)?;
        factory(args).await
    }

    pub async fn build_random(&self, name: &str, args: &str) -> Result<RandomEngine> {
        let factory = lookup("random", &self.random, name)?;
        factory(args).await
    }

    /// Builds one engine per family. Fails on the first family that cannot
    /// be built.
    pub async fn build(
        &self,
        snowflake: &ProviderSpec,
        segment: &ProviderSpec,
        random: &ProviderSpec,
    ) -> Result<Providers> {
        Ok(Providers {
            snowflake: self.build_snowflake(&snowflake.name, &snowflake.args).await?,
            segment: self.build_segment(&segment.name, &segment.args).await?,
            random: self.build_random(&random.name, &random.args).await?,
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register_snowflake("static", static_snowflake)
            .register_segment("mem", mem_segment)
            .register_random("uuid", uuid_random);
        #[cfg(feature = "etcd")]
        registry.register_snowflake("elected", elected_snowflake);
        #[cfg(feature = "postgres")]
        registry.register_segment("sql", sql_segment);
        registry
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("snowflake", &self.snowflake_providers())
            .field("segment", &self.segment_providers())
            .field("random", &self.random_providers())
            .finish()
    }
}

fn insert<E>(
    table: &mut Vec<(&'static str, Factory<E>)>,
    name: &'static str,
    factory: Factory<E>,
) {
    match table.iter_mut().find(|(n, _)| *n == name) {
        Some(entry) => entry.1 = factory,
        None => table.push((name, factory)),
    }
}

fn names<E>(table: &[(&'static str, Factory<E>)]) -> Vec<&'static str> {
    table.iter().map(|(name, _)| *name).collect()
}

fn lookup<'t, E>(
    family: &'static str,
    table: &'t [(&'static str, Factory<E>)],
    name: &str,
) -> Result<&'t Factory<E>> {
    table
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, factory)| factory)
        .ok_or_else(|| Error::ProviderNotImplemented {
            family,
            name: name.to_owned(),
            available: format!("[{}]", names(table).join(", ")),
        })
}

fn static_snowflake(args: &str) -> BoxFuture<'_, Result<SnowflakeEngine>> {
    async move {
        let identifier = FixedIdentifier::from_args(args)?;
        Ok(SnowflakeEngine::new("static", identifier))
    }
    .boxed()
}

#[cfg(feature = "etcd")]
fn elected_snowflake(args: &str) -> BoxFuture<'_, Result<SnowflakeEngine>> {
    async move {
        let identifier = crate::ElectedIdentifier::from_args(args).await?;
        Ok(SnowflakeEngine::new("elected", identifier))
    }
    .boxed()
}

fn mem_segment(args: &str) -> BoxFuture<'_, Result<SegmentEngine>> {
    async move {
        let storage = MemStorage::from_args(args)?;
        SegmentEngine::new("mem", storage).await
    }
    .boxed()
}

#[cfg(feature = "postgres")]
fn sql_segment(args: &str) -> BoxFuture<'_, Result<SegmentEngine>> {
    async move {
        let storage = crate::SqlStorage::connect(args).await?;
        SegmentEngine::new("sql", storage).await
    }
    .boxed()
}

fn uuid_random(_args: &str) -> BoxFuture<'_, Result<RandomEngine>> {
    futures::future::ready(Ok(RandomEngine::new("uuid"))).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorCode, Identifier};

    #[test]
    fn default_registry_lists_builtins() {
        let registry = Registry::default();
        assert_eq!(registry.snowflake_providers()[0], "static");
        assert_eq!(registry.segment_providers()[0], "mem");
        assert_eq!(registry.random_providers(), ["uuid"]);
        #[cfg(feature = "etcd")]
        assert!(registry.snowflake_providers().contains(&"elected"));
        #[cfg(feature = "postgres")]
        assert!(registry.segment_providers().contains(&"sql"));
    }

    #[tokio::test]
    async fn unknown_provider_names_the_available_ones() {
        let registry = Registry::default();
        let err = registry.build_segment("redis", "").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProviderNotImplemented);
        match err {
            Error::ProviderNotImplemented {
                family,
                name,
                available,
            } => {
                assert_eq!(family, "segment");
                assert_eq!(name, "redis");
                assert!(available.starts_with("[mem"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = Registry::empty().build_random("uuid", "").await.unwrap_err();
        assert!(err.to_string().contains("available: []"));
    }

    #[tokio::test]
    async fn builds_each_family() {
        let providers = Registry::default()
            .build(
                &ProviderSpec::new("static", "4"),
                &ProviderSpec::new("mem", "tag=order,step=10"),
                &ProviderSpec::new("uuid", "ignored"),
            )
            .await
            .unwrap();

        assert_eq!(providers.snowflake.name(), "static");
        assert_eq!(providers.snowflake.machine_id(), 4);
        assert_eq!(providers.segment.next_value("order").await.unwrap(), 1);
        assert_eq!(providers.random.name(), "uuid");
    }

    #[tokio::test]
    async fn bad_arguments_fail_the_build() {
        let registry = Registry::default();
        for (name, args) in [("static", "16"), ("static", "")] {
            let err = registry.build_snowflake(name, args).await.unwrap_err();
            assert!(matches!(err, Error::Configuration { .. }));
        }
        let err = registry.build_segment("mem", "tag=a").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InitFailed);
    }

    #[tokio::test]
    async fn custom_factories_replace_builtins() {
        #[derive(Debug)]
        struct Seven;
        impl Identifier for Seven {
            fn identify(&self) -> u64 {
                7
            }
        }

        fn seven(_args: &str) -> BoxFuture<'_, Result<SnowflakeEngine>> {
            futures::future::ready(Ok(SnowflakeEngine::new("static", Seven))).boxed()
        }

        let mut registry = Registry::default();
        registry.register_snowflake("static", seven);
        let count = registry.snowflake_providers().len();
        assert_eq!(count, Registry::default().snowflake_providers().len());

        let engine = registry.build_snowflake("static", "not-a-number").await.unwrap();
        assert_eq!(engine.machine_id(), 7);
    }
}
