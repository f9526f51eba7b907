//! Declared relations between records
//!
//! A relation is configuration: kind, target table, foreign-key column,
//! plus optional scope conditions and a back-reference name. Traversal is
//! a plain one-query lookup resolved on first access and cached on the
//! owning record; there is no eager-loading machinery.

use crate::clause::Clause;
use crate::driver::Database;
use crate::operator::{Connector, Operator};
use crate::record::Record;
use crate::schema::SchemaSource;
use crate::{Error, Result, Value};

/// The closed set of relation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

/// Declared association between two record types
#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: RelationKind,
    /// Target table name
    pub table: String,
    /// Foreign-key column: on the target for has-one/has-many, on the
    /// owning record for belongs-to
    pub foreign_key: String,
    /// Target primary-key column when it is not `id`
    pub primary_key: Option<String>,
    /// Extra conditions applied to the target query
    pub scope: Vec<(String, Operator, Value)>,
    /// Attribute name under which the owner is attached to resolved targets
    pub backref: Option<String>,
}

impl Relation {
    pub fn belongs_to(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::declare(RelationKind::BelongsTo, table, foreign_key)
    }

    pub fn has_one(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::declare(RelationKind::HasOne, table, foreign_key)
    }

    pub fn has_many(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::declare(RelationKind::HasMany, table, foreign_key)
    }

    fn declare(
        kind: RelationKind,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            foreign_key: foreign_key.into(),
            primary_key: None,
            scope: Vec::new(),
            backref: None,
        }
    }

    /// Override the target's primary-key column
    pub fn target_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Constrain the target query with an extra condition
    pub fn scope(mut self, field: impl Into<String>, operator: Operator, value: Value) -> Self {
        self.scope.push((field.into(), operator, value));
        self
    }

    /// Attach the owner to each resolved target under `name`
    pub fn backref(mut self, name: impl Into<String>) -> Self {
        self.backref = Some(name.into());
        self
    }
}

/// A resolved relation: callers branch on the shape explicitly
#[derive(Debug, Clone)]
pub enum Related {
    One(Record),
    Many(Vec<Record>),
    Absent,
}

impl Related {
    pub fn is_absent(&self) -> bool {
        matches!(self, Related::Absent)
    }
}

/// A declared relation plus its cached resolution
#[derive(Debug, Clone)]
pub(crate) struct RelationSlot {
    pub(crate) relation: Relation,
    pub(crate) cached: Option<Related>,
}

impl Record {
    /// Declare a relation under `name`
    pub fn relate(&mut self, name: impl Into<String>, relation: Relation) -> &mut Self {
        self.relations.insert(
            name.into(),
            RelationSlot {
                relation,
                cached: None,
            },
        );
        self
    }

    /// Resolve the relation declared under `name`, fetching on first access
    /// and answering from the cache afterwards. An undeclared name fails
    /// fast with `RelationNotFound`.
    pub async fn related<D>(&mut self, name: &str, db: &D) -> Result<&Related>
    where
        D: Database + SchemaSource,
    {
        let relation = match self.relations.get(name) {
            None => return Err(Error::relation_not_found(name)),
            Some(slot) if slot.cached.is_some() => None,
            Some(slot) => Some(slot.relation.clone()),
        };
        if let Some(relation) = relation {
            let mut resolved = self.resolve(&relation, db).await?;
            if let Some(backref) = &relation.backref {
                self.attach_backref(backref, &mut resolved);
            }
            if let Some(slot) = self.relations.get_mut(name) {
                slot.cached = Some(resolved);
            }
        }
        self.relations
            .get(name)
            .and_then(|slot| slot.cached.as_ref())
            .ok_or_else(|| Error::relation_not_found(name))
    }

    async fn resolve<D>(&self, relation: &Relation, db: &D) -> Result<Related>
    where
        D: Database + SchemaSource,
    {
        let schema = self.session.schema(&relation.table, db).await?;
        let mut target = Record::from_schema(self.session.clone(), schema);
        if let Some(key) = &relation.primary_key {
            target.primary_key = key.clone();
        }
        for (field, operator, value) in &relation.scope {
            target.add_condition(
                field,
                *operator,
                vec![value.clone()],
                Connector::And,
                Clause::Where,
            )?;
        }
        match relation.kind {
            RelationKind::HasOne => {
                let key = self.owner_key()?;
                target.eq(&relation.foreign_key, key);
                if target.find(db).await? {
                    Ok(Related::One(target))
                } else {
                    Ok(Related::Absent)
                }
            }
            RelationKind::HasMany => {
                let key = self.owner_key()?;
                target.eq(&relation.foreign_key, key);
                Ok(Related::Many(target.find_all(db).await?))
            }
            RelationKind::BelongsTo => {
                let key = self
                    .get(&relation.foreign_key)
                    .cloned()
                    .ok_or_else(|| {
                        Error::column_not_found(self.table(), &relation.foreign_key)
                    })?;
                let target_key = target.primary_key.clone();
                target.eq(&target_key, key);
                if target.find(db).await? {
                    Ok(Related::One(target))
                } else {
                    Ok(Related::Absent)
                }
            }
        }
    }

    fn owner_key(&self) -> Result<Value> {
        self.get(&self.primary_key)
            .cloned()
            .ok_or_else(|| Error::missing_primary_key(self.table()))
    }

    /// Store a data-only copy of this record on each resolved target
    fn attach_backref(&self, name: &str, resolved: &mut Related) {
        let owner = self.detached_copy();
        match resolved {
            Related::One(child) => child.accept_backref(name, owner),
            Related::Many(children) => {
                for child in children {
                    child.accept_backref(name, owner.clone());
                }
            }
            Related::Absent => {}
        }
    }

    /// A copy carrying attributes only, no clause state, no relations
    fn detached_copy(&self) -> Record {
        let mut copy = self.sibling();
        copy.attributes = self.attributes.clone();
        copy.snapshot();
        copy
    }

    fn accept_backref(&mut self, name: &str, owner: Record) {
        let relation = Relation::belongs_to(owner.table(), owner.primary_key());
        self.relations.insert(
            name.to_string(),
            RelationSlot {
                relation,
                cached: Some(Related::One(owner)),
            },
        );
    }
}
