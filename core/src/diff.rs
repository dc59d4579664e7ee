//! Declared-vs-live index diffing.
//!
//! Pure plan computation: given a collection's declared indexes and the
//! index names present on the live table, produce the minimal set of
//! `CREATE INDEX` / `DROP INDEX` statements that reconciles them. Running
//! the plan and diffing again yields an empty plan.

use std::collections::BTreeSet;

use crate::ddl::{self, Statement};
use crate::descriptor::{index_prefix, CollectionDescriptor, CustomIndex};
use crate::error::CoreError;

/// An index observed on the live table (from `pg_indexes`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveIndex {
    pub name: String,
    pub table: String,
}

/// The reconciliation plan for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPlan {
    pub create: Vec<Statement>,
    pub drop: Vec<Statement>,
}

impl IndexPlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.drop.is_empty()
    }

    pub fn len(&self) -> usize {
        self.create.len() + self.drop.len()
    }
}

/// Diff declared indexes against the live set.
///
/// Declared-but-missing indexes are created. Live indexes are dropped only
/// when they sit inside this collection's `idx_<table>_` namespace and are
/// neither declared structurally nor declared as a custom index. Primary
/// key and constraint indexes live outside the namespace and are never
/// touched.
pub fn diff_indexes(
    collection: &CollectionDescriptor,
    custom: &[CustomIndex],
    live: &[LiveIndex],
) -> Result<IndexPlan, CoreError> {
    let live_names: BTreeSet<&str> = live.iter().map(|i| i.name.as_str()).collect();

    let mut declared_names = BTreeSet::new();
    let mut plan = IndexPlan::default();

    for index in &collection.indexes {
        let name = index.name(&collection.name);
        if !live_names.contains(name.as_str()) {
            plan.create.push(ddl::create_index(collection, index)?);
        }
        declared_names.insert(name);
    }
    for index in custom {
        declared_names.insert(index.name.clone());
    }

    let prefix = index_prefix(&collection.name);
    for index in live {
        if index.name.starts_with(&prefix) && !declared_names.contains(&index.name) {
            plan.drop.push(ddl::drop_index_by_name(&index.name));
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::IndexDescriptor;

    fn posts() -> CollectionDescriptor {
        CollectionDescriptor::new("Posts")
            .index(IndexDescriptor::new(["postedAt"]))
            .index(IndexDescriptor::new(["userId", "postedAt"]))
    }

    fn live(names: &[&str]) -> Vec<LiveIndex> {
        names
            .iter()
            .map(|n| LiveIndex {
                name: n.to_string(),
                table: "Posts".to_string(),
            })
            .collect()
    }

    #[test]
    fn missing_indexes_are_created() {
        let plan = diff_indexes(&posts(), &[], &live(&["Posts_pkey"])).unwrap();
        assert_eq!(plan.create.len(), 2);
        assert!(plan.drop.is_empty());
    }

    #[test]
    fn undeclared_convention_indexes_are_dropped() {
        let plan = diff_indexes(
            &posts(),
            &[],
            &live(&[
                "Posts_pkey",
                "idx_posts_postedat",
                "idx_posts_userid_postedat",
                "idx_posts_legacyid",
            ]),
        )
        .unwrap();
        assert!(plan.create.is_empty());
        assert_eq!(plan.drop.len(), 1);
        assert_eq!(plan.drop[0].sql, "DROP INDEX IF EXISTS \"idx_posts_legacyid\"");
    }

    #[test]
    fn primary_key_index_is_never_dropped() {
        let plan = diff_indexes(&CollectionDescriptor::new("Posts"), &[], &live(&["Posts_pkey"]))
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn custom_indexes_survive_the_diff() {
        let custom = vec![CustomIndex {
            name: "idx_posts_title_trgm".to_string(),
            create_sql:
                "CREATE INDEX IF NOT EXISTS idx_posts_title_trgm ON \"Posts\" USING gin (title)"
                    .to_string(),
        }];
        let plan = diff_indexes(
            &CollectionDescriptor::new("Posts"),
            &custom,
            &live(&["idx_posts_title_trgm"]),
        )
        .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn diff_reaches_a_fixed_point() {
        // Simulate applying the plan: live set becomes pkey + declared names.
        let collection = posts();
        let applied = live(&[
            "Posts_pkey",
            "idx_posts_postedat",
            "idx_posts_userid_postedat",
        ]);
        let plan = diff_indexes(&collection, &[], &applied).unwrap();
        assert!(plan.is_empty());
    }
}
