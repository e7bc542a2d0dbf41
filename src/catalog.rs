// Catalog loading and the lookups the presentation layer needs

use crate::cache::{CATALOG_KEY, Snapshot, SnapshotCache};
use crate::filter::{Filter, TextQuery};
use crate::index::{Diagnostic, TraitIndex, build_trait_index, decode_records};
use crate::payload::{Payload, PayloadKind};
use crate::record::{Collection, Record};
use crate::source::RecordSource;
use eyre::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How `Catalog::load` treats the snapshot cache
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Cache key the snapshot lives under
    pub key: String,
    /// Skip the cache lookup and always fetch
    pub refresh: bool,
    /// Snapshots older than this are refetched; `None` never expires
    pub max_age: Option<Duration>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            key: CATALOG_KEY.to_string(),
            refresh: false,
            max_age: None,
        }
    }
}

impl LoadOptions {
    fn is_fresh(&self, snapshot: &Snapshot, now_ms: i64) -> bool {
        match self.max_age {
            Some(max_age) => (snapshot.age_ms(now_ms) as u128) <= max_age.as_millis(),
            None => true,
        }
    }
}

/// A trait together with the champions that declare it
#[derive(Debug)]
pub struct TraitSummary<'a> {
    pub name: String,
    /// The trait's own record; `None` when only champions mention it
    pub record: Option<&'a Record>,
    pub champions: Vec<&'a Record>,
}

/// Decoded catalog collections and the trait index
#[derive(Debug, Clone)]
pub struct Catalog {
    fetched_at: i64,
    from_cache: bool,
    champions: TraitIndex,
    traits: Vec<Record>,
    items: Vec<Record>,
    augments: Vec<Record>,
    diagnostics: Vec<Diagnostic>,
}

impl Catalog {
    /// Load the catalog from the cache or, failing that, from the source
    ///
    /// Cache failures are logged and never fail the load; a fresh fetch is
    /// written back to the cache.
    pub fn load(source: &dyn RecordSource, cache: &mut dyn SnapshotCache, options: &LoadOptions) -> Result<Self> {
        let now = now_ms();

        if !options.refresh {
            match cache.get(&options.key) {
                Ok(Some(snapshot)) if options.is_fresh(&snapshot, now) => {
                    info!(key = %options.key, age_ms = snapshot.age_ms(now), "Restored catalog from snapshot");
                    return Self::from_snapshot(&snapshot, true);
                }
                Ok(Some(snapshot)) => {
                    debug!(key = %options.key, age_ms = snapshot.age_ms(now), "Snapshot is stale, refetching");
                }
                Ok(None) => debug!(key = %options.key, "No snapshot cached"),
                Err(e) => warn!(key = %options.key, error = %e, "Failed to read snapshot, refetching"),
            }
        }

        let mut fetched = BTreeMap::new();
        let mut snapshot = Snapshot::new(now);
        for collection in Collection::CATALOG {
            let records = source
                .fetch_all(collection)
                .with_context(|| format!("Failed to fetch {}", collection))?;
            info!(%collection, count = records.len(), "Fetched collection");
            snapshot.insert_records(collection, &records);
            fetched.insert(collection, records);
        }

        if let Err(e) = cache.put(&options.key, &snapshot) {
            warn!(key = %options.key, error = %e, "Failed to store snapshot");
        }

        Ok(Self::from_records(fetched, now, false))
    }

    /// Rebuild a catalog from a cached snapshot
    pub fn from_snapshot(snapshot: &Snapshot, from_cache: bool) -> Result<Self> {
        let mut collections = BTreeMap::new();
        for collection in Collection::CATALOG {
            collections.insert(collection, snapshot.records(collection)?);
        }
        Ok(Self::from_records(collections, snapshot.fetched_at, from_cache))
    }

    /// Decode and index already fetched collections
    ///
    /// Champions are ordered by ascending cost (missing cost last, ties keep
    /// source order) before indexing, so trait buckets follow that order too.
    pub fn from_records(mut collections: BTreeMap<Collection, Vec<Record>>, fetched_at: i64, from_cache: bool) -> Self {
        let mut champions = collections.remove(&Collection::Champions).unwrap_or_default();
        champions.sort_by_cached_key(|record| champion_cost(record).unwrap_or(u32::MAX));

        let champions = build_trait_index(champions);
        let mut diagnostics = champions.diagnostics().to_vec();

        let mut decode = |collection: Collection| {
            let (records, found) = decode_records(collections.remove(&collection).unwrap_or_default());
            diagnostics.extend(found);
            records
        };
        let traits = decode(Collection::Traits);
        let items = decode(Collection::Items);
        let augments = decode(Collection::Augments);

        debug!(
            champions = champions.records().len(),
            traits = traits.len(),
            items = items.len(),
            augments = augments.len(),
            diagnostics = diagnostics.len(),
            "Catalog built"
        );

        Self {
            fetched_at,
            from_cache,
            champions,
            traits,
            items,
            augments,
            diagnostics,
        }
    }

    /// Milliseconds since epoch when the data was fetched
    pub fn fetched_at(&self) -> i64 {
        self.fetched_at
    }

    /// Whether this catalog was restored from a snapshot
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn index(&self) -> &TraitIndex {
        &self.champions
    }

    /// Champions ordered by cost
    pub fn champions(&self) -> &[Record] {
        self.champions.records()
    }

    pub fn traits(&self) -> &[Record] {
        &self.traits
    }

    pub fn items(&self) -> &[Record] {
        &self.items
    }

    pub fn augments(&self) -> &[Record] {
        &self.augments
    }

    /// Records of a collection; collections outside the catalog are empty
    pub fn records(&self, collection: Collection) -> &[Record] {
        match collection {
            Collection::Champions => self.champions(),
            Collection::Traits => &self.traits,
            Collection::Items => &self.items,
            Collection::Augments => &self.augments,
            Collection::Builds | Collection::Users => &[],
        }
    }

    pub fn find(&self, collection: Collection, id: &str) -> Option<&Record> {
        self.records(collection).iter().find(|r| r.id == id)
    }

    /// Champions declaring `name`; empty for an unknown trait
    pub fn champions_with_trait(&self, name: &str) -> Vec<&Record> {
        self.champions.champions_with(name)
    }

    /// Every trait with its champions
    ///
    /// Trait records come first in collection order, followed by traits that
    /// champions declare but the trait collection lacks.
    pub fn trait_summaries(&self) -> Vec<TraitSummary<'_>> {
        let mut seen = HashSet::new();
        let mut summaries = Vec::new();

        for record in &self.traits {
            let name = record.name().unwrap_or(&record.id).to_string();
            if !seen.insert(name.clone()) {
                continue;
            }
            summaries.push(TraitSummary {
                champions: self.champions_with_trait(&name),
                name,
                record: Some(record),
            });
        }

        for name in self.champions.trait_names() {
            if seen.contains(name) {
                continue;
            }
            summaries.push(TraitSummary {
                name: name.to_string(),
                record: None,
                champions: self.champions_with_trait(name),
            });
        }

        summaries
    }

    /// Records of `collection` matching a text query
    pub fn search(&self, collection: Collection, query: &TextQuery) -> Vec<&Record> {
        self.records(collection).iter().filter(|r| query.matches(r)).collect()
    }

    /// Records of `collection` matching every filter
    pub fn filter(&self, collection: Collection, filters: &[Filter]) -> Vec<&Record> {
        self.records(collection)
            .iter()
            .filter(|r| filters.iter().all(|f| f.matches(r)))
            .collect()
    }

    /// Count active traits over a selection of champions
    ///
    /// Each id counts once per occurrence. Unknown ids are skipped with a
    /// warning. Sorted by count, highest first, then by name.
    pub fn trait_tally(&self, champion_ids: &[&str]) -> Vec<(String, usize)> {
        let by_id: HashMap<&str, &Record> = self.champions().iter().map(|r| (r.id.as_str(), r)).collect();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for id in champion_ids {
            let Some(champion) = by_id.get(id) else {
                warn!(id = %id, "Unknown champion in tally, skipping");
                continue;
            };
            for name in champion.traits() {
                *counts.entry(name.as_str()).or_default() += 1;
            }
        }

        let mut tally: Vec<(String, usize)> = counts.into_iter().map(|(name, n)| (name.to_string(), n)).collect();
        tally.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        tally
    }

    /// Decode problems across all collections
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Cost used to order champions; decodes on demand when not yet parsed
fn champion_cost(record: &Record) -> Option<u32> {
    if let Some(payload) = &record.parsed {
        return payload.cost();
    }
    let raw = record.raw.as_deref()?;
    Payload::decode(Some(PayloadKind::Champion), raw).ok()?.cost()
}

/// Current time in milliseconds since epoch
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::index::DiagnosticKind;
    use crate::source::MemorySource;
    use eyre::eyre;
    use std::cell::Cell;

    fn champion(id: &str, raw: &str) -> Record {
        Record::new(Collection::Champions, id, raw)
    }

    fn source() -> MemorySource {
        MemorySource::new()
            .with(
                Collection::Champions,
                vec![
                    champion("TFT14_Jinx", r#"{"name":"Jinx","cost":5,"traits":["Golden Ox","Marksman"]}"#),
                    champion("TFT14_Vi", r#"{"name":"Vi","cost":2,"traits":"[\"Cypher\",\"Bruiser\"]"}"#),
                    champion("TFT14_Jax", r#"{"name":"Jax","cost":1,"traits":["Exotech","Bruiser"]}"#),
                    champion("TFT14_Garen", r#"{"name":"Garen","traits":["Bruiser"]}"#),
                    champion("TFT14_Shaco", r#"{"name":"Shaco","cost":1,"traits":["Syndicate","Slayer"]}"#),
                    champion("TFT14_Broken", "{"),
                ],
            )
            .with(
                Collection::Traits,
                vec![
                    Record::new(Collection::Traits, "Bruiser", r#"{"name":"Bruiser","desc":"Gain max health"}"#),
                    Record::new(Collection::Traits, "Marksman", r#"{"name":"Marksman","desc":"Gain attack damage"}"#),
                    Record::new(Collection::Traits, "Divinicorp", r#"{"name":"Divinicorp"}"#),
                ],
            )
            .with(
                Collection::Items,
                vec![
                    Record::new(Collection::Items, "TFT_Item_BFSword", r#"{"name":"B.F. Sword","desc":"+10 AD"}"#),
                    Record::new(Collection::Items, "TFT_Item_Bad", "nope"),
                ],
            )
            .with(
                Collection::Augments,
                vec![Record::new(Collection::Augments, "TFT_Augment_Lotus", r#"{"name":"Jeweled Lotus"}"#)],
            )
    }

    fn ids<'a>(records: &[&'a Record]) -> Vec<&'a str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    /// Source that counts fetches and can be told to fail
    struct CountingSource {
        inner: MemorySource,
        fetches: Cell<usize>,
        fail: bool,
    }

    impl RecordSource for CountingSource {
        fn fetch_all(&self, collection: Collection) -> Result<Vec<Record>> {
            self.fetches.set(self.fetches.get() + 1);
            if self.fail {
                return Err(eyre!("network down"));
            }
            self.inner.fetch_all(collection)
        }
    }

    fn counting(fail: bool) -> CountingSource {
        CountingSource {
            inner: source(),
            fetches: Cell::new(0),
            fail,
        }
    }

    #[test]
    fn test_champions_sorted_by_cost() {
        let mut cache = MemoryCache::new();
        let catalog = Catalog::load(&source(), &mut cache, &LoadOptions::default()).unwrap();

        let order: Vec<_> = catalog.champions().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            order,
            vec!["TFT14_Jax", "TFT14_Shaco", "TFT14_Vi", "TFT14_Jinx", "TFT14_Garen", "TFT14_Broken"]
        );
    }

    #[test]
    fn test_trait_buckets_follow_cost_order() {
        let mut cache = MemoryCache::new();
        let catalog = Catalog::load(&source(), &mut cache, &LoadOptions::default()).unwrap();

        assert_eq!(
            ids(&catalog.champions_with_trait("Bruiser")),
            vec!["TFT14_Jax", "TFT14_Vi", "TFT14_Garen"]
        );
        assert!(catalog.champions_with_trait("Nope").is_empty());
        assert!(catalog.index().get("Nope").is_none());
    }

    #[test]
    fn test_load_writes_snapshot_then_restores_it() {
        let mut cache = MemoryCache::new();
        let src = counting(false);

        let first = Catalog::load(&src, &mut cache, &LoadOptions::default()).unwrap();
        assert!(!first.from_cache());
        assert_eq!(src.fetches.get(), 4);
        assert!(cache.get(CATALOG_KEY).unwrap().is_some());

        let second = Catalog::load(&src, &mut cache, &LoadOptions::default()).unwrap();
        assert!(second.from_cache());
        assert_eq!(src.fetches.get(), 4);
        assert_eq!(second.champions(), first.champions());
        assert_eq!(
            ids(&second.champions_with_trait("Bruiser")),
            ids(&first.champions_with_trait("Bruiser"))
        );
    }

    #[test]
    fn test_refresh_bypasses_cache() {
        let mut cache = MemoryCache::new();
        let src = counting(false);

        Catalog::load(&src, &mut cache, &LoadOptions::default()).unwrap();
        let options = LoadOptions {
            refresh: true,
            ..LoadOptions::default()
        };
        let catalog = Catalog::load(&src, &mut cache, &options).unwrap();

        assert!(!catalog.from_cache());
        assert_eq!(src.fetches.get(), 8);
    }

    #[test]
    fn test_stale_snapshot_refetched() {
        let mut cache = MemoryCache::new();
        let mut old = Snapshot::new(0);
        old.insert_records(Collection::Champions, &[champion("Old", r#"{"name":"Old"}"#)]);
        cache.put(CATALOG_KEY, &old).unwrap();

        let src = counting(false);
        let options = LoadOptions {
            max_age: Some(Duration::from_secs(60)),
            ..LoadOptions::default()
        };
        let catalog = Catalog::load(&src, &mut cache, &options).unwrap();

        assert!(!catalog.from_cache());
        assert!(catalog.find(Collection::Champions, "Old").is_none());
        assert!(cache.get(CATALOG_KEY).unwrap().unwrap().fetched_at > 0);
    }

    #[test]
    fn test_fetch_failure_propagates() {
        let mut cache = MemoryCache::new();
        let err = Catalog::load(&counting(true), &mut cache, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.root_cause().to_string(), "network down");
    }

    #[test]
    fn test_diagnostics_collected_across_collections() {
        let mut cache = MemoryCache::new();
        let catalog = Catalog::load(&source(), &mut cache, &LoadOptions::default()).unwrap();

        let found: Vec<_> = catalog
            .diagnostics()
            .iter()
            .map(|d| (d.collection, d.record_id.as_str(), d.kind))
            .collect();
        assert_eq!(
            found,
            vec![
                (Collection::Champions, "TFT14_Broken", DiagnosticKind::MalformedPayload),
                (Collection::Items, "TFT_Item_Bad", DiagnosticKind::MalformedPayload),
            ]
        );
    }

    #[test]
    fn test_trait_summaries() {
        let mut cache = MemoryCache::new();
        let catalog = Catalog::load(&source(), &mut cache, &LoadOptions::default()).unwrap();
        let summaries = catalog.trait_summaries();

        let names: Vec<_> = summaries.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Bruiser", "Marksman", "Divinicorp", "Cypher", "Exotech", "Golden Ox", "Slayer", "Syndicate"]
        );

        assert_eq!(summaries[0].champions.len(), 3);
        assert!(summaries[2].champions.is_empty());
        assert!(summaries[2].record.is_some());
        assert!(summaries[3].record.is_none());
    }

    #[test]
    fn test_search_and_filter() {
        let mut cache = MemoryCache::new();
        let catalog = Catalog::load(&source(), &mut cache, &LoadOptions::default()).unwrap();

        let hits = catalog.search(Collection::Items, &TextQuery::new("sword"));
        assert_eq!(ids(&hits), vec!["TFT_Item_BFSword"]);

        let hits = catalog.search(Collection::Traits, &TextQuery::new("health"));
        assert_eq!(ids(&hits), vec!["Bruiser"]);

        let filters: Vec<Filter> = vec!["cost<=2".parse().unwrap(), "trait=Bruiser".parse().unwrap()];
        let hits = catalog.filter(Collection::Champions, &filters);
        assert_eq!(ids(&hits), vec!["TFT14_Jax", "TFT14_Vi"]);

        assert!(catalog.search(Collection::Builds, &TextQuery::new("")).is_empty());
    }

    #[test]
    fn test_trait_tally() {
        let mut cache = MemoryCache::new();
        let catalog = Catalog::load(&source(), &mut cache, &LoadOptions::default()).unwrap();

        let tally = catalog.trait_tally(&["TFT14_Vi", "TFT14_Jax", "TFT14_Garen", "TFT14_Unknown"]);
        assert_eq!(
            tally,
            vec![
                ("Bruiser".to_string(), 3),
                ("Cypher".to_string(), 1),
                ("Exotech".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_from_records_without_collections() {
        let catalog = Catalog::from_records(BTreeMap::new(), 0, false);
        assert!(catalog.champions().is_empty());
        assert!(catalog.index().is_empty());
        assert!(catalog.trait_summaries().is_empty());
    }
}
