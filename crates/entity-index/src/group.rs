//! Group index: the entity index specialized to [`InternalGroup`].
//!
//! Groups are keyed by UUID. Query results are ordered by UUID so that
//! paging through an unchanged index is stable.

use std::ops::Deref;
use std::sync::Arc;

use entity_types::{AccountId, GroupUuid, IndexSettings, InternalGroup};

use crate::cache::EntityCache;
use crate::entity_index::EntityIndex;
use crate::error::IndexError;
use crate::predicate::{Matchable, Operator, OperatorPredicate, Predicate};
use crate::schema::{FieldDef, FieldValue, IndexSchema, IndexedEntity};

/// Entity kind name; also the directory prefix, e.g. `groups_0002`.
pub const GROUPS: &str = "groups";

/// Group field names.
pub mod fields {
    pub const ID: &str = "id";
    pub const UUID: &str = "uuid";
    pub const OWNER_UUID: &str = "owneruuid";
    pub const NAME: &str = "name";
    /// Lower-cased name parts, for prefix search
    pub const NAME_PART: &str = "inname";
    pub const DESCRIPTION: &str = "description";
    pub const IS_VISIBLE_TO_ALL: &str = "is_visible_to_all";
    pub const CREATED_ON: &str = "created_on";
    pub const MEMBER: &str = "member";
    pub const SUBGROUP: &str = "subgroup";
}

/// Group lookup used to hydrate query hits.
pub type GroupCache = dyn EntityCache<InternalGroup>;

impl IndexedEntity for InternalGroup {
    type Key = GroupUuid;

    fn key(&self) -> GroupUuid {
        self.uuid.clone()
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// The known versions of the group schema.
pub struct GroupSchemaDefinitions;

impl GroupSchemaDefinitions {
    pub const LATEST_VERSION: u32 = 2;

    fn v1_fields() -> Vec<FieldDef<InternalGroup>> {
        vec![
            FieldDef::integer(fields::ID, |g: &InternalGroup| {
                vec![FieldValue::Int(i64::from(g.id))]
            })
            .stored(),
            FieldDef::exact(fields::UUID, |g: &InternalGroup| vec![g.uuid.as_str().into()])
                .stored()
                .sortable(),
            FieldDef::exact(fields::OWNER_UUID, |g: &InternalGroup| {
                vec![g.owner_group_uuid.as_str().into()]
            })
            .stored(),
            FieldDef::exact(fields::NAME, |g: &InternalGroup| vec![g.name.as_str().into()])
                .stored(),
            FieldDef::prefix(fields::NAME_PART, |g: &InternalGroup| {
                g.name_parts().into_iter().map(FieldValue::Str).collect()
            }),
            FieldDef::full_text(fields::DESCRIPTION, |g: &InternalGroup| {
                g.description.iter().map(|d| d.as_str().into()).collect()
            })
            .stored(),
            FieldDef::exact(fields::IS_VISIBLE_TO_ALL, |g: &InternalGroup| {
                vec![flag(g.visible_to_all).into()]
            })
            .stored(),
            FieldDef::timestamp(fields::CREATED_ON, |g: &InternalGroup| {
                vec![FieldValue::Int(g.created_on.timestamp_millis())]
            })
            .stored(),
        ]
    }

    /// Name, ownership, description and visibility fields.
    pub fn v1() -> Result<IndexSchema<InternalGroup>, IndexError> {
        IndexSchema::new(GROUPS, 1, fields::UUID, Self::v1_fields())
    }

    /// Adds membership: direct member accounts and subgroups.
    pub fn v2() -> Result<IndexSchema<InternalGroup>, IndexError> {
        let mut defs = Self::v1_fields();
        defs.push(FieldDef::exact(fields::MEMBER, |g: &InternalGroup| {
            g.members.iter().map(|m| m.to_string().into()).collect()
        }));
        defs.push(FieldDef::exact(fields::SUBGROUP, |g: &InternalGroup| {
            g.subgroups.iter().map(|s| s.as_str().into()).collect()
        }));
        IndexSchema::new(GROUPS, 2, fields::UUID, defs)
    }

    pub fn latest() -> Result<IndexSchema<InternalGroup>, IndexError> {
        Self::v2()
    }

    pub fn get(version: u32) -> Result<IndexSchema<InternalGroup>, IndexError> {
        match version {
            1 => Self::v1(),
            2 => Self::v2(),
            other => Err(IndexError::InvalidSchema(format!(
                "unknown {} schema version {}",
                GROUPS, other
            ))),
        }
    }
}

/// Secondary index of groups.
pub struct GroupIndex {
    inner: EntityIndex<InternalGroup>,
}

impl GroupIndex {
    /// Open the latest group schema.
    pub fn open(settings: &IndexSettings, cache: Arc<GroupCache>) -> Result<Self, IndexError> {
        Self::open_with_schema(GroupSchemaDefinitions::latest()?, settings, cache)
    }

    pub fn open_with_schema(
        schema: IndexSchema<InternalGroup>,
        settings: &IndexSettings,
        cache: Arc<GroupCache>,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            inner: EntityIndex::open(schema, settings, cache)?,
        })
    }

    pub fn into_inner(self) -> EntityIndex<InternalGroup> {
        self.inner
    }
}

impl Deref for GroupIndex {
    type Target = EntityIndex<InternalGroup>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// In-memory evaluation of a group predicate leaf.
struct GroupMatcher {
    value: String,
    test: fn(&InternalGroup, &str) -> bool,
}

impl Matchable<InternalGroup> for GroupMatcher {
    fn matches(&self, group: &InternalGroup) -> bool {
        (self.test)(group, &self.value)
    }
}

fn matchable(
    field: &str,
    operator: Operator,
    value: String,
    test: fn(&InternalGroup, &str) -> bool,
) -> Predicate<InternalGroup> {
    let matcher = Arc::new(GroupMatcher {
        value: value.clone(),
        test,
    });
    Predicate::Operator(OperatorPredicate::new(field, operator, value).with_matcher(matcher))
}

/// Predicate constructors over group fields.
///
/// Leaves that can be checked against a loaded group carry a matcher, so
/// the same predicate can filter cached groups without the index.
pub struct GroupPredicates;

impl GroupPredicates {
    pub fn uuid(uuid: &GroupUuid) -> Predicate<InternalGroup> {
        matchable(fields::UUID, Operator::Equals, uuid.to_string(), |g, v| {
            g.uuid.as_str() == v
        })
    }

    pub fn id(id: i32) -> Predicate<InternalGroup> {
        matchable(fields::ID, Operator::Equals, id.to_string(), |g, v| {
            g.id.to_string() == v
        })
    }

    pub fn name(name: &str) -> Predicate<InternalGroup> {
        matchable(fields::NAME, Operator::Equals, name.to_string(), |g, v| g.name == v)
    }

    /// Groups with a name part starting with `part` (case-insensitive).
    pub fn inname(part: &str) -> Predicate<InternalGroup> {
        matchable(
            fields::NAME_PART,
            Operator::Prefix,
            part.to_lowercase(),
            |g, v| g.name_parts().iter().any(|p| p.starts_with(v)),
        )
    }

    pub fn description(text: &str) -> Predicate<InternalGroup> {
        Predicate::contains(fields::DESCRIPTION, text)
    }

    pub fn owner(owner: &GroupUuid) -> Predicate<InternalGroup> {
        matchable(fields::OWNER_UUID, Operator::Equals, owner.to_string(), |g, v| {
            g.owner_group_uuid.as_str() == v
        })
    }

    pub fn member(account: AccountId) -> Predicate<InternalGroup> {
        matchable(fields::MEMBER, Operator::Equals, account.to_string(), |g, v| {
            g.members.iter().any(|m| m.to_string() == v)
        })
    }

    pub fn subgroup(subgroup: &GroupUuid) -> Predicate<InternalGroup> {
        matchable(fields::SUBGROUP, Operator::Equals, subgroup.to_string(), |g, v| {
            g.subgroups.iter().any(|s| s.as_str() == v)
        })
    }

    pub fn visible_to_all(visible: bool) -> Predicate<InternalGroup> {
        matchable(
            fields::IS_VISIBLE_TO_ALL,
            Operator::Equals,
            flag(visible).to_string(),
            |g, v| flag(g.visible_to_all) == v,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryEntityCache;
    use crate::document::DocumentCodec;
    use crate::source::QueryOptions;

    fn uuid(s: &str) -> GroupUuid {
        GroupUuid::new(s).unwrap()
    }

    fn admins() -> InternalGroup {
        InternalGroup::new(1, uuid("a0"), "Administrators")
            .with_description("Gerrit site administrators")
            .with_members(vec![AccountId(1000), AccountId(1001)])
    }

    #[test]
    fn test_schema_versions() {
        let v1 = GroupSchemaDefinitions::v1().unwrap();
        let v2 = GroupSchemaDefinitions::latest().unwrap();
        assert_eq!(v1.version(), 1);
        assert_eq!(v2.version(), GroupSchemaDefinitions::LATEST_VERSION);
        assert!(v1.field(fields::MEMBER).is_none());
        assert!(v2.field(fields::MEMBER).is_some());
        assert_eq!(v2.key_field().name(), fields::UUID);
        assert_eq!(v2.directory_name(), "groups_0002");
        assert!(GroupSchemaDefinitions::get(1).is_ok());
        assert!(GroupSchemaDefinitions::get(9).is_err());
    }

    #[test]
    fn test_group_document_fields() {
        let schema = Arc::new(GroupSchemaDefinitions::latest().unwrap());
        let codec = DocumentCodec::new(schema.clone(), &schema.to_tantivy()).unwrap();
        let group = admins().with_visible_to_all(true);

        let doc = codec.to_document(&group);
        assert_eq!(codec.to_entity_key(&doc), Some(uuid("a0")));

        let bundle = codec.to_field_bundle(&doc, None);
        assert_eq!(bundle.first_str(fields::NAME), Some("Administrators"));
        assert_eq!(bundle.first_str(fields::IS_VISIBLE_TO_ALL), Some("1"));
        assert_eq!(bundle.first_i64(fields::ID), Some(1));
        assert_eq!(
            bundle.first_i64(fields::CREATED_ON),
            Some(group.created_on.timestamp_millis())
        );
        // Membership is indexed but not stored
        assert!(!bundle.contains(fields::MEMBER));
    }

    #[test]
    fn test_predicates_match_in_memory() {
        let group = admins();
        assert_eq!(GroupPredicates::uuid(&uuid("a0")).matches(&group), Some(true));
        assert_eq!(GroupPredicates::inname("ADMIN").matches(&group), Some(true));
        assert_eq!(GroupPredicates::member(AccountId(1001)).matches(&group), Some(true));
        assert_eq!(GroupPredicates::member(AccountId(7)).matches(&group), Some(false));
        assert_eq!(GroupPredicates::visible_to_all(false).matches(&group), Some(true));
        assert_eq!(GroupPredicates::owner(&uuid("a0")).matches(&group), Some(true));
        // Full-text leaves are index-only
        assert_eq!(GroupPredicates::description("gerrit").matches(&group), None);
    }

    #[test]
    fn test_group_index_queries() {
        let devs = InternalGroup::new(2, uuid("b0"), "Developers")
            .with_owner(uuid("a0"))
            .with_subgroups(vec![uuid("c0")]);
        let cache: Arc<InMemoryEntityCache<InternalGroup>> =
            Arc::new([admins(), devs.clone()].into_iter().collect());
        let index = GroupIndex::open(&IndexSettings::in_memory(), cache).unwrap();
        index.replace(&admins()).unwrap();
        index.replace(&devs).unwrap();
        index.refresh().unwrap();

        let by_owner = index
            .query(&GroupPredicates::owner(&uuid("a0")), QueryOptions::default())
            .unwrap();
        assert_eq!(by_owner.len(), 2);

        let by_subgroup = index
            .query(&GroupPredicates::subgroup(&uuid("c0")), QueryOptions::default())
            .unwrap();
        assert_eq!(by_subgroup.to_list(), vec![devs]);

        let by_text = index
            .query(&GroupPredicates::description("administrators"), QueryOptions::default())
            .unwrap();
        assert_eq!(by_text.first().map(|g| g.id), Some(1));

        let by_id = index.query(&GroupPredicates::id(2), QueryOptions::default()).unwrap();
        assert_eq!(by_id.len(), 1);

        assert!(index.get(&uuid("a0")).unwrap().is_some());
    }
}
