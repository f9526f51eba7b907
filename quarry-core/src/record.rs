//! Record: a table row as an in-memory object
//!
//! A `Record` accumulates statement state through chained condition and
//! clause calls, renders it into parameterized SQL on a terminal action
//! (find / find_all / insert / update / delete), and tracks which columns
//! changed since the last load or write so updates touch only dirty data.
//!
//! A record moves between two states: clean (no pending clause state) and
//! building (conditions or clauses applied). Terminal actions render and
//! execute the statement, then reset back to clean; a failed execution
//! propagates the error and leaves the record building so the caller can
//! inspect or retry.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::clause::{Clause, ClauseSet, JoinType};
use crate::driver::{Database, Row};
use crate::expr::{Expression, Term, WrapExpression};
use crate::operator::{Connector, Operator};
use crate::relation::RelationSlot;
use crate::schema::{SchemaSource, TableSchema};
use crate::session::Session;
use crate::{Error, Result, Value};

/// Clause order for SELECT statements
const QUERY_CLAUSES: &[Clause] = &[
    Clause::Select,
    Clause::From,
    Clause::Join,
    Clause::Where,
    Clause::Group,
    Clause::Having,
    Clause::Order,
    Clause::Limit,
];

/// One database row held as an in-memory object
#[derive(Debug, Clone)]
pub struct Record {
    pub(crate) session: Arc<Session>,
    pub(crate) schema: Arc<TableSchema>,
    pub(crate) primary_key: String,
    pub(crate) attributes: IndexMap<String, Value>,
    prior: IndexMap<String, Value>,
    clauses: ClauseSet,
    bindings: Vec<(String, Value)>,
    group: Option<Vec<Expression>>,
    next_connector: Option<Connector>,
    pub(crate) relations: HashMap<String, RelationSlot>,
}

impl Record {
    /// Create a record for `table`, loading its schema through `source`
    /// (cached per session after the first load).
    pub async fn open<S>(session: &Arc<Session>, table: &str, source: &S) -> Result<Record>
    where
        S: SchemaSource,
    {
        let schema = session.schema(table, source).await?;
        Ok(Record::from_schema(session.clone(), schema))
    }

    /// Create a record over an already-loaded schema
    pub fn from_schema(session: Arc<Session>, schema: Arc<TableSchema>) -> Record {
        Record {
            session,
            schema,
            primary_key: "id".to_string(),
            attributes: IndexMap::new(),
            prior: IndexMap::new(),
            clauses: ClauseSet::new(),
            bindings: Vec::new(),
            group: None,
            next_connector: None,
            relations: HashMap::new(),
        }
    }

    /// Use `column` as the primary key instead of `id`
    pub fn with_primary_key(mut self, column: &str) -> Result<Self> {
        if !self.schema.contains(column) {
            return Err(Error::column_not_found(self.schema.table(), column));
        }
        self.primary_key = column.to_string();
        Ok(self)
    }

    pub fn table(&self) -> &str {
        self.schema.table()
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// An empty record sharing this record's session, schema and key
    pub(crate) fn sibling(&self) -> Record {
        Record {
            session: self.session.clone(),
            schema: self.schema.clone(),
            primary_key: self.primary_key.clone(),
            attributes: IndexMap::new(),
            prior: IndexMap::new(),
            clauses: ClauseSet::new(),
            bindings: Vec::new(),
            group: None,
            next_connector: None,
            relations: HashMap::new(),
        }
    }

    // ---- attributes ----------------------------------------------------

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Set a column value. Column membership is validated against the table
    /// schema; anything else fails fast.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<&mut Self> {
        if !self.schema.contains(column) {
            return Err(Error::column_not_found(self.schema.table(), column));
        }
        self.attributes.insert(column.to_string(), value.into());
        Ok(self)
    }

    pub fn unset(&mut self, column: &str) -> Option<Value> {
        self.attributes.shift_remove(column)
    }

    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    /// Export the current attributes as a JSON object
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.attributes
                .iter()
                .map(|(column, value)| (column.clone(), value.to_json()))
                .collect(),
        )
    }

    // ---- dirty tracking ------------------------------------------------

    /// Columns whose current value differs from the last snapshot.
    ///
    /// A column never snapshotted but currently set counts unconditionally
    /// (the insert case). Iteration follows schema column order.
    pub fn changed_attributes(&self) -> IndexMap<String, Value> {
        let mut changed = IndexMap::new();
        for column in self.schema.columns().keys() {
            match (self.prior.get(column), self.attributes.get(column)) {
                (Some(old), Some(current)) if old != current => {
                    changed.insert(column.clone(), current.clone());
                }
                (None, Some(current)) => {
                    changed.insert(column.clone(), current.clone());
                }
                _ => {}
            }
        }
        changed
    }

    /// Remember the current attribute values as the persisted state
    pub fn snapshot(&mut self) {
        self.prior = self.attributes.clone();
    }

    /// Drop all pending clause and binding state and re-snapshot
    pub fn reset(&mut self) -> &mut Self {
        self.clauses.clear();
        self.bindings.clear();
        self.group = None;
        self.next_connector = None;
        self.snapshot();
        self
    }

    // ---- placeholder binding -------------------------------------------

    fn bind(&mut self, value: Value) -> String {
        let token = self.session.placeholder();
        self.bindings.push((token.clone(), value));
        token
    }

    pub fn bindings(&self) -> &[(String, Value)] {
        &self.bindings
    }

    // ---- conditions ----------------------------------------------------

    /// Join the next condition (or group close) with OR instead of AND
    pub fn or(&mut self) -> &mut Self {
        self.next_connector = Some(Connector::Or);
        self
    }

    pub fn eq(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(field, Operator::Eq, value.into())
    }

    pub fn ne(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(field, Operator::Ne, value.into())
    }

    pub fn gt(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(field, Operator::Gt, value.into())
    }

    pub fn lt(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(field, Operator::Lt, value.into())
    }

    pub fn ge(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(field, Operator::Ge, value.into())
    }

    pub fn le(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(field, Operator::Le, value.into())
    }

    pub fn like(&mut self, field: &str, pattern: impl Into<Value>) -> &mut Self {
        self.compare(field, Operator::Like, pattern.into())
    }

    pub fn regexp(&mut self, field: &str, pattern: impl Into<Value>) -> &mut Self {
        self.compare(field, Operator::Regexp, pattern.into())
    }

    pub fn is_null(&mut self, field: &str) -> &mut Self {
        let connector = self.take_connector();
        let expr = Expression::unary(self.where_source(field), Operator::IsNull.as_str());
        self.route(Clause::Where, expr, connector);
        self
    }

    pub fn is_not_null(&mut self, field: &str) -> &mut Self {
        let connector = self.take_connector();
        let expr = Expression::unary(self.where_source(field), Operator::IsNotNull.as_str());
        self.route(Clause::Where, expr, connector);
        self
    }

    pub fn between(
        &mut self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> &mut Self {
        let connector = self.take_connector();
        let low = Term::raw(self.bind(low.into()));
        let high = Term::raw(self.bind(high.into()));
        let expr = Expression::binary(
            self.where_source(field),
            Operator::Between.as_str(),
            Term::from(WrapExpression::between(low, high)),
        );
        self.route(Clause::Where, expr, connector);
        self
    }

    /// Add an `IN (...)` condition. An empty sequence fails fast, since `IN ()`
    /// is not valid SQL.
    pub fn in_list<I>(&mut self, field: &str, values: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let connector = self.take_connector();
        self.add_condition(field, Operator::In, values, connector, Clause::Where)
    }

    /// Add a `NOT IN (...)` condition; empty sequences fail fast
    pub fn not_in<I>(&mut self, field: &str, values: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let connector = self.take_connector();
        self.add_condition(field, Operator::NotIn, values, connector, Clause::Where)
    }

    /// Add a condition with the operator given by name (`"eq"`, `">="`,
    /// `"like"`, ...). Unrecognized names fail with `UnknownOperation`.
    pub fn condition(
        &mut self,
        field: &str,
        operator: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        let operator: Operator = operator.parse()?;
        let connector = self.take_connector();
        let values = if operator.takes_value() {
            vec![value.into()]
        } else {
            Vec::new()
        };
        self.add_condition(field, operator, values, connector, Clause::Where)
    }

    /// Bind `values`, build the condition expression and merge it into the
    /// named clause with `connector`. This is the funnel every condition
    /// method goes through.
    ///
    /// The field is table-qualified for the WHERE clause only.
    pub fn add_condition(
        &mut self,
        field: &str,
        operator: Operator,
        values: Vec<Value>,
        connector: Connector,
        clause: Clause,
    ) -> Result<&mut Self> {
        let source = if clause == Clause::Where {
            self.where_source(field)
        } else {
            Term::raw(field)
        };
        let target = match operator {
            Operator::IsNull | Operator::IsNotNull => None,
            Operator::In | Operator::NotIn => {
                if values.is_empty() {
                    return Err(Error::empty_value_list(field));
                }
                let mut items = Vec::with_capacity(values.len());
                for value in values {
                    items.push(Term::raw(self.bind(value)));
                }
                Some(Term::from(WrapExpression::new(items)))
            }
            Operator::Between => {
                if values.len() != 2 {
                    return Err(Error::invalid_query("BETWEEN requires exactly two values"));
                }
                let mut values = values.into_iter();
                let (low, high) = match (values.next(), values.next()) {
                    (Some(low), Some(high)) => (low, high),
                    _ => return Err(Error::invalid_query("BETWEEN requires exactly two values")),
                };
                let low = Term::raw(self.bind(low));
                let high = Term::raw(self.bind(high));
                Some(Term::from(WrapExpression::between(low, high)))
            }
            _ => {
                let value = values.into_iter().next().ok_or_else(|| {
                    Error::invalid_query(format!("operator {} requires a value", operator))
                })?;
                Some(Term::raw(self.bind(value)))
            }
        };
        let expr = match target {
            Some(target) => Expression::binary(source, operator.as_str(), target),
            None => Expression::unary(source, operator.as_str()),
        };
        self.route(clause, expr, connector);
        Ok(self)
    }

    /// Open a grouping scope: conditions added until `end_group` are
    /// collected and merged as one parenthesized unit. One level only; a
    /// second `begin_group` before closing is a no-op.
    pub fn begin_group(&mut self) -> &mut Self {
        if self.group.is_none() {
            self.group = Some(Vec::new());
        }
        self
    }

    /// Close the grouping scope and merge the collected conditions into the
    /// WHERE clause. Closing an empty or never-opened group changes nothing.
    pub fn end_group(&mut self) -> &mut Self {
        let connector = self.take_connector();
        if let Some(pending) = self.group.take() {
            if !pending.is_empty() {
                let terms = pending.into_iter().map(Term::from).collect();
                self.merge(
                    Clause::Where,
                    Term::from(WrapExpression::group(terms)),
                    connector,
                );
            }
        }
        self
    }

    fn compare(&mut self, field: &str, operator: Operator, value: Value) -> &mut Self {
        let connector = self.take_connector();
        let target = Term::raw(self.bind(value));
        let expr = Expression::binary(self.where_source(field), operator.as_str(), target);
        self.route(Clause::Where, expr, connector);
        self
    }

    fn where_source(&self, field: &str) -> Term {
        Term::raw(format!("{}.{}", self.schema.table(), field))
    }

    fn take_connector(&mut self) -> Connector {
        self.next_connector.take().unwrap_or(Connector::And)
    }

    fn route(&mut self, clause: Clause, expr: Expression, connector: Connector) {
        if clause == Clause::Where {
            if let Some(pending) = self.group.as_mut() {
                if pending.is_empty() {
                    pending.push(expr);
                } else {
                    pending.push(Expression::new(connector.as_str(), Term::from(expr)));
                }
                return;
            }
        }
        self.merge(clause, Term::from(expr), connector);
    }

    /// Merge rule: an empty clause takes the item under its keyword; an
    /// occupied clause nests left-associatively, old target first.
    fn merge(&mut self, clause: Clause, item: Term, connector: Connector) {
        match self.clauses.take(clause) {
            None => {
                self.clauses.set(clause, Expression::new(clause.keyword(), item));
            }
            Some(mut head) => {
                head.target = Some(match head.target.take() {
                    Some(old) => {
                        Term::from(Expression::binary(old, connector.as_str(), item))
                    }
                    None => item,
                });
                self.clauses.set(clause, head);
            }
        }
    }

    // ---- raw clauses ---------------------------------------------------

    pub fn select(&mut self, columns: &str) -> &mut Self {
        self.raw_clause(Clause::Select, columns)
    }

    pub fn from(&mut self, table: &str) -> &mut Self {
        self.raw_clause(Clause::From, table)
    }

    /// Replace the WHERE clause with a raw condition string
    pub fn where_raw(&mut self, condition: &str) -> &mut Self {
        self.raw_clause(Clause::Where, condition)
    }

    /// Replace the SET clause with a raw assignment string
    pub fn set_raw(&mut self, assignments: &str) -> &mut Self {
        self.raw_clause(Clause::Set, assignments)
    }

    pub fn group(&mut self, columns: &str) -> &mut Self {
        self.raw_clause(Clause::Group, columns)
    }

    pub fn group_by(&mut self, columns: &str) -> &mut Self {
        self.group(columns)
    }

    pub fn having(&mut self, condition: &str) -> &mut Self {
        self.raw_clause(Clause::Having, condition)
    }

    pub fn order(&mut self, ordering: &str) -> &mut Self {
        self.raw_clause(Clause::Order, ordering)
    }

    pub fn order_by(&mut self, ordering: &str) -> &mut Self {
        self.order(ordering)
    }

    pub fn limit(&mut self, count: u64) -> &mut Self {
        self.raw_clause(Clause::Limit, count.to_string())
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.raw_clause(Clause::Offset, offset.to_string())
    }

    pub fn top(&mut self, count: u64) -> &mut Self {
        self.raw_clause(Clause::Top, count.to_string())
    }

    /// Add a JOIN clause; further joins chain onto the existing ones
    pub fn join(&mut self, table: &str, on: &str, join_type: JoinType) -> &mut Self {
        let on_expr = Expression::binary(Term::raw(table), "ON", Term::raw(on));
        let joined = match self.clauses.take(Clause::Join) {
            Some(previous) => Expression::binary(
                Term::from(previous),
                format!("{} JOIN", join_type),
                Term::from(on_expr),
            ),
            None => Expression::new(format!("{} JOIN", join_type), Term::from(on_expr)),
        };
        self.clauses.set(Clause::Join, joined);
        self
    }

    fn raw_clause(&mut self, clause: Clause, value: impl Into<String>) -> &mut Self {
        self.clauses
            .set(clause, Expression::new(clause.keyword(), Term::raw(value)));
        self
    }

    // ---- assembly ------------------------------------------------------

    /// Render the named clauses into one parameterized statement
    pub fn build_sql(&self, order: &[Clause]) -> String {
        let sql = self.clauses.build(order, self.schema.table());
        tracing::debug!(table = self.schema.table(), sql = %sql, "built statement");
        sql
    }

    // ---- terminal actions ----------------------------------------------

    /// Fetch the first row matching the built conditions into this record.
    ///
    /// Returns `Ok(true)` when a row matched; `Ok(false)` is the distinct
    /// not-found result. Either way the record resets to clean.
    pub async fn find<D>(&mut self, db: &D) -> Result<bool>
    where
        D: Database,
    {
        self.limit(1);
        let sql = self.build_sql(QUERY_CLAUSES);
        let row = db.fetch_one(&sql, &self.bindings).await?;
        let found = match row {
            Some(row) => {
                self.populate(row);
                true
            }
            None => false,
        };
        self.reset();
        Ok(found)
    }

    /// Reset, add a primary-key equality condition, and find
    pub async fn find_by_id<D>(&mut self, db: &D, id: impl Into<Value>) -> Result<bool>
    where
        D: Database,
    {
        self.reset();
        let key = self.primary_key.clone();
        self.eq(&key, id.into());
        self.find(db).await
    }

    /// Fetch every row matching the built conditions as its own record
    pub async fn find_all<D>(&mut self, db: &D) -> Result<Vec<Record>>
    where
        D: Database,
    {
        let sql = self.build_sql(QUERY_CLAUSES);
        let rows = db.fetch_all(&sql, &self.bindings).await?;
        self.reset();
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = self.sibling();
            record.populate(row);
            record.snapshot();
            records.push(record);
        }
        Ok(records)
    }

    /// Insert the dirty attributes as a new row. With nothing dirty this is
    /// a no-op success. The generated key reported by the driver becomes
    /// the primary-key value.
    pub async fn insert<D>(&mut self, db: &D) -> Result<()>
    where
        D: Database,
    {
        let changed = self.changed_attributes();
        if changed.is_empty() {
            return Ok(());
        }
        let mut columns = Vec::with_capacity(changed.len());
        let mut placeholders = Vec::with_capacity(changed.len());
        for (column, value) in changed {
            columns.push(Term::raw(column));
            placeholders.push(Term::raw(self.bind(value)));
        }
        let insert = Expression::new(
            format!("INSERT INTO {}", self.schema.table()),
            Term::from(WrapExpression::new(columns)),
        );
        self.clauses.set(Clause::Insert, insert);
        self.clauses.set(
            Clause::Values,
            Expression::new(
                Clause::Values.keyword(),
                Term::from(WrapExpression::new(placeholders)),
            ),
        );
        let sql = self.build_sql(&[Clause::Insert, Clause::Values]);
        let result = db.execute(&sql, &self.bindings).await?;
        if let Some(id) = result.last_insert_id {
            if id != 0 {
                self.attributes
                    .insert(self.primary_key.clone(), Value::from(id));
            }
        }
        self.reset();
        Ok(())
    }

    /// Write the dirty attributes back, keyed on the primary key. With
    /// nothing dirty this is a no-op success.
    pub async fn update<D>(&mut self, db: &D) -> Result<()>
    where
        D: Database,
    {
        let changed = self.changed_attributes();
        if changed.is_empty() {
            return Ok(());
        }
        let key = self.primary_key_value()?;
        for (column, value) in changed {
            let token = self.bind(value);
            let assignment =
                Expression::binary(Term::raw(column), Operator::Eq.as_str(), Term::raw(token));
            self.merge(Clause::Set, Term::from(assignment), Connector::Comma);
        }
        let pk = self.primary_key.clone();
        self.eq(&pk, key);
        let sql = self.build_sql(&[Clause::Update, Clause::Set, Clause::Where]);
        db.execute(&sql, &self.bindings).await?;
        self.reset();
        Ok(())
    }

    /// Delete the row this record points at, keyed on the primary key.
    /// Returns the number of affected rows.
    pub async fn delete<D>(&mut self, db: &D) -> Result<u64>
    where
        D: Database,
    {
        let key = self.primary_key_value()?;
        let pk = self.primary_key.clone();
        self.eq(&pk, key);
        let sql = self.build_sql(&[Clause::Delete, Clause::From, Clause::Where]);
        let result = db.execute(&sql, &self.bindings).await?;
        self.reset();
        Ok(result.rows_affected)
    }

    fn primary_key_value(&self) -> Result<Value> {
        self.attributes
            .get(&self.primary_key)
            .cloned()
            .ok_or_else(|| Error::missing_primary_key(self.schema.table()))
    }

    pub(crate) fn populate(&mut self, row: Row) {
        self.attributes.clear();
        for (column, value) in row {
            if self.schema.contains(&column) {
                self.attributes.insert(column, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ExecResult;
    use indexmap::indexmap;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn users_schema() -> Arc<TableSchema> {
        Arc::new(TableSchema::new(
            "users",
            indexmap! {
                "id".to_string() => "int(11)".to_string(),
                "name".to_string() => "varchar(255)".to_string(),
                "login".to_string() => "varchar(64)".to_string(),
                "email".to_string() => "varchar(255)".to_string(),
            },
        ))
    }

    fn users_record() -> Record {
        Record::from_schema(Session::new(), users_schema())
    }

    /// Mock database that records statements and replays canned rows
    #[derive(Default)]
    struct MockDb {
        statements: Mutex<Vec<(String, Vec<(String, Value)>)>>,
        rows: Mutex<Vec<Row>>,
        last_insert_id: Option<u64>,
        fail_execute: bool,
    }

    impl MockDb {
        fn with_rows(rows: Vec<Row>) -> Self {
            Self {
                rows: Mutex::new(rows),
                ..Self::default()
            }
        }

        fn with_last_insert_id(id: u64) -> Self {
            Self {
                last_insert_id: Some(id),
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail_execute: true,
                ..Self::default()
            }
        }

        fn statements(&self) -> Vec<(String, Vec<(String, Value)>)> {
            self.statements.lock().unwrap().clone()
        }
    }

    impl Database for MockDb {
        async fn execute(&self, sql: &str, bindings: &[(String, Value)]) -> Result<ExecResult> {
            if self.fail_execute {
                return Err(Error::statement("mock execute failure"));
            }
            self.statements
                .lock()
                .unwrap()
                .push((sql.to_string(), bindings.to_vec()));
            Ok(ExecResult {
                rows_affected: 1,
                last_insert_id: self.last_insert_id,
            })
        }

        async fn fetch_all(&self, sql: &str, bindings: &[(String, Value)]) -> Result<Vec<Row>> {
            self.statements
                .lock()
                .unwrap()
                .push((sql.to_string(), bindings.to_vec()));
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn fetch_one(
            &self,
            sql: &str,
            bindings: &[(String, Value)],
        ) -> Result<Option<Row>> {
            self.statements
                .lock()
                .unwrap()
                .push((sql.to_string(), bindings.to_vec()));
            Ok(self.rows.lock().unwrap().first().cloned())
        }
    }

    #[test]
    fn test_select_where_equality() {
        let mut user = users_record();
        user.eq("email", "vasya@petya.ru");
        let sql = user.build_sql(&[Clause::Select, Clause::From, Clause::Where]);
        assert_eq!(sql, "SELECT users.* FROM users WHERE users.email = :ph1");
        assert_eq!(
            user.bindings(),
            &[(":ph1".to_string(), Value::from("vasya@petya.ru"))]
        );
    }

    #[test]
    fn test_and_then_or_concatenation_is_left_associative() {
        let mut user = users_record();
        user.gt("id", 1).eq("name", "Vasya").or().eq("login", "vasya-petya");
        let sql = user.build_sql(&[Clause::Select, Clause::From, Clause::Where]);
        assert_eq!(
            sql,
            "SELECT users.* FROM users WHERE users.id > :ph1 \
             AND users.name = :ph2 OR users.login = :ph3"
        );
    }

    #[test]
    fn test_or_connector_is_consumed_once() {
        let mut user = users_record();
        user.eq("name", "a").or().eq("login", "b").eq("email", "c");
        let sql = user.build_sql(&[Clause::Where]);
        assert_eq!(
            sql,
            "WHERE users.name = :ph1 OR users.login = :ph2 AND users.email = :ph3"
        );
    }

    #[test]
    fn test_grouped_conditions_render_in_parens() {
        let mut user = users_record();
        user.eq("email", "vasya@petya.ru")
            .begin_group()
            .gt("id", 18)
            .or()
            .lt("id", 10)
            .end_group();
        let sql = user.build_sql(&[Clause::Where]);
        assert_eq!(
            sql,
            "WHERE users.email = :ph1 AND (users.id > :ph2 OR users.id < :ph3)"
        );
    }

    #[test]
    fn test_group_merged_with_or() {
        let mut user = users_record();
        user.eq("email", "a@b.c")
            .begin_group()
            .eq("name", "Vasya")
            .eq("login", "vasya")
            .end_group();
        let sql = user.build_sql(&[Clause::Where]);
        assert_eq!(
            sql,
            "WHERE users.email = :ph1 AND (users.name = :ph2 AND users.login = :ph3)"
        );

        let mut user = users_record();
        user.eq("email", "a@b.c")
            .begin_group()
            .eq("name", "Vasya")
            .or()
            .end_group();
        let sql = user.build_sql(&[Clause::Where]);
        assert_eq!(sql, "WHERE users.email = :ph1 OR (users.name = :ph2)");
    }

    #[test]
    fn test_empty_group_is_a_noop() {
        let mut user = users_record();
        user.eq("email", "a@b.c").begin_group().end_group();
        let sql = user.build_sql(&[Clause::Where]);
        assert_eq!(sql, "WHERE users.email = :ph1");
    }

    #[test]
    fn test_between_condition() {
        let mut user = users_record();
        user.between("id", 10, 20);
        let sql = user.build_sql(&[Clause::Where]);
        assert_eq!(sql, "WHERE users.id BETWEEN :ph1 AND :ph2");
        assert_eq!(
            user.bindings(),
            &[
                (":ph1".to_string(), Value::I32(10)),
                (":ph2".to_string(), Value::I32(20)),
            ]
        );
    }

    #[test]
    fn test_in_list_condition() {
        let mut user = users_record();
        user.in_list("id", vec![1, 2, 3]).unwrap();
        let sql = user.build_sql(&[Clause::Where]);
        assert_eq!(sql, "WHERE users.id IN (:ph1, :ph2, :ph3)");
    }

    #[test]
    fn test_not_in_condition() {
        let mut user = users_record();
        user.not_in("id", vec![4, 5]).unwrap();
        let sql = user.build_sql(&[Clause::Where]);
        assert_eq!(sql, "WHERE users.id NOT IN (:ph1, :ph2)");
    }

    #[test]
    fn test_empty_in_list_fails_fast() {
        let mut user = users_record();
        let err = user.in_list("id", Vec::<i32>::new()).unwrap_err();
        assert!(matches!(err, Error::EmptyValueList { .. }));
        // nothing was merged
        assert_eq!(user.build_sql(&[Clause::Where]), "");
    }

    #[test]
    fn test_null_conditions() {
        let mut user = users_record();
        user.is_not_null("id").is_null("email");
        let sql = user.build_sql(&[Clause::Where]);
        assert_eq!(sql, "WHERE users.id IS NOT NULL AND users.email IS NULL");
        assert!(user.bindings().is_empty());
    }

    #[test]
    fn test_condition_by_operator_name() {
        let mut user = users_record();
        user.condition("id", "ge", 5).unwrap();
        let sql = user.build_sql(&[Clause::Where]);
        assert_eq!(sql, "WHERE users.id >= :ph1");
    }

    #[test]
    fn test_condition_unknown_operator_fails() {
        let mut user = users_record();
        let err = user.condition("id", "sounds_like", 5).unwrap_err();
        assert!(matches!(err, Error::UnknownOperation { .. }));
    }

    #[test]
    fn test_attribute_boundary_is_validated() {
        let mut user = users_record();
        user.set("name", "Vasya").unwrap();
        assert_eq!(user.get("name"), Some(&Value::from("Vasya")));

        let err = user.set("age", 30).unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound { .. }));
        assert_eq!(user.get("age"), None);
    }

    #[test]
    fn test_to_json_exports_attributes() {
        let mut user = users_record();
        user.set("id", 7i64).unwrap();
        user.set("name", "Vasya").unwrap();
        assert_eq!(
            user.to_json(),
            serde_json::json!({"id": 7, "name": "Vasya"})
        );
    }

    #[test]
    fn test_dirty_tracking_round_trip() {
        let mut user = users_record();
        user.set("name", "Vasya").unwrap();
        user.set("email", "vasya@petya.ru").unwrap();
        user.snapshot();
        assert!(user.changed_attributes().is_empty());

        user.set("name", "Fedya").unwrap();
        let changed = user.changed_attributes();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed.get("name"), Some(&Value::from("Fedya")));
    }

    #[test]
    fn test_unsnapshotted_attributes_count_as_dirty() {
        let mut user = users_record();
        user.set("name", "Vasya").unwrap();
        let changed = user.changed_attributes();
        assert_eq!(changed.len(), 1);
        assert!(changed.contains_key("name"));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut user = users_record();
        user.eq("name", "Vasya").limit(5);
        user.reset();
        assert!(user.bindings().is_empty());
        assert_eq!(user.build_sql(&[Clause::Where, Clause::Limit]), "");
        user.reset();
        assert!(user.bindings().is_empty());
        assert_eq!(user.build_sql(&[Clause::Where, Clause::Limit]), "");
    }

    #[test]
    fn test_raw_clause_methods() {
        let mut user = users_record();
        user.select("id, name")
            .order("id desc")
            .limit(2)
            .offset(1);
        let sql = user.build_sql(&[
            Clause::Select,
            Clause::From,
            Clause::Order,
            Clause::Limit,
            Clause::Offset,
        ]);
        assert_eq!(
            sql,
            "SELECT id, name FROM users ORDER BY id desc LIMIT 2 OFFSET 1"
        );
    }

    #[test]
    fn test_group_by_and_having() {
        let mut user = users_record();
        user.group_by("login").having("COUNT(*) > 1");
        let sql = user.build_sql(&[Clause::Select, Clause::From, Clause::Group, Clause::Having]);
        assert_eq!(
            sql,
            "SELECT users.* FROM users GROUP BY login HAVING COUNT(*) > 1"
        );
    }

    #[test]
    fn test_join_chains() {
        let mut user = users_record();
        user.join("contacts", "contacts.user_id = users.id", JoinType::Left)
            .join("orders", "orders.user_id = users.id", JoinType::Inner);
        let sql = user.build_sql(&[Clause::Select, Clause::From, Clause::Join]);
        assert_eq!(
            sql,
            "SELECT users.* FROM users \
             LEFT JOIN contacts ON contacts.user_id = users.id \
             INNER JOIN orders ON orders.user_id = users.id"
        );
    }

    #[tokio::test]
    async fn test_insert_builds_from_dirty_attributes() {
        let db = MockDb::with_last_insert_id(42);
        let mut user = users_record();
        user.set("name", "Vasya").unwrap();
        user.set("login", "vasya-petya").unwrap();
        user.set("email", "vasya@petya.ru").unwrap();
        user.insert(&db).await.unwrap();

        let statements = db.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].0,
            "INSERT INTO users (name, login, email) VALUES (:ph1, :ph2, :ph3)"
        );
        assert_eq!(
            statements[0].1,
            vec![
                (":ph1".to_string(), Value::from("Vasya")),
                (":ph2".to_string(), Value::from("vasya-petya")),
                (":ph3".to_string(), Value::from("vasya@petya.ru")),
            ]
        );
        // generated key captured, transient state gone
        assert_eq!(user.get("id"), Some(&Value::I64(42)));
        assert!(user.bindings().is_empty());
        assert!(user.changed_attributes().is_empty());
    }

    #[tokio::test]
    async fn test_insert_with_nothing_dirty_is_a_noop() {
        let db = MockDb::default();
        let mut user = users_record();
        user.insert(&db).await.unwrap();
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_update_writes_only_dirty_columns() {
        let db = MockDb::default();
        let mut user = users_record();
        user.set("id", 7i64).unwrap();
        user.set("name", "Vasya").unwrap();
        user.set("email", "vasya@petya.ru").unwrap();
        user.snapshot();

        user.set("name", "Fedya").unwrap();
        user.update(&db).await.unwrap();

        let statements = db.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].0,
            "UPDATE users SET name = :ph1 WHERE users.id = :ph2"
        );
        assert_eq!(
            statements[0].1,
            vec![
                (":ph1".to_string(), Value::from("Fedya")),
                (":ph2".to_string(), Value::I64(7)),
            ]
        );
        assert!(user.changed_attributes().is_empty());
    }

    #[tokio::test]
    async fn test_update_joins_multiple_assignments_with_commas() {
        let db = MockDb::default();
        let mut user = users_record();
        user.set("id", 7i64).unwrap();
        user.snapshot();
        user.set("name", "Fedya").unwrap();
        user.set("email", "fedya@petya.ru").unwrap();
        user.update(&db).await.unwrap();

        assert_eq!(
            db.statements()[0].0,
            "UPDATE users SET name = :ph1, email = :ph2 WHERE users.id = :ph3"
        );
    }

    #[tokio::test]
    async fn test_update_with_nothing_dirty_is_a_noop() {
        let db = MockDb::default();
        let mut user = users_record();
        user.set("id", 7i64).unwrap();
        user.snapshot();
        user.update(&db).await.unwrap();
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_update_without_primary_key_fails() {
        let db = MockDb::default();
        let mut user = users_record();
        user.set("name", "Fedya").unwrap();
        let err = user.update(&db).await.unwrap_err();
        assert!(matches!(err, Error::MissingPrimaryKey { .. }));
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_delete_keys_on_primary_key() {
        let db = MockDb::default();
        let mut user = users_record();
        user.set("id", 7i64).unwrap();
        let affected = user.delete(&db).await.unwrap();
        assert_eq!(affected, 1);
        assert_eq!(
            db.statements()[0].0,
            "DELETE FROM users WHERE users.id = :ph1"
        );
    }

    #[tokio::test]
    async fn test_find_populates_and_resets() {
        let row: Row = indexmap! {
            "id".to_string() => Value::I64(7),
            "name".to_string() => Value::from("Vasya"),
            "email".to_string() => Value::from("vasya@petya.ru"),
            "stray".to_string() => Value::from("dropped"),
        };
        let db = MockDb::with_rows(vec![row]);
        let mut user = users_record();
        let found = user.eq("email", "vasya@petya.ru").find(&db).await.unwrap();

        assert!(found);
        assert_eq!(
            db.statements()[0].0,
            "SELECT users.* FROM users WHERE users.email = :ph1 LIMIT 1"
        );
        assert_eq!(user.get("name"), Some(&Value::from("Vasya")));
        // columns outside the schema are dropped on populate
        assert_eq!(user.get("stray"), None);
        // loaded state is the new snapshot
        assert!(user.changed_attributes().is_empty());
        assert!(user.bindings().is_empty());
    }

    #[tokio::test]
    async fn test_find_by_id_conditions_on_primary_key() {
        let db = MockDb::default();
        let mut user = users_record();
        let found = user.find_by_id(&db, 7i64).await.unwrap();
        assert!(!found);
        assert_eq!(
            db.statements()[0].0,
            "SELECT users.* FROM users WHERE users.id = :ph1 LIMIT 1"
        );
    }

    #[tokio::test]
    async fn test_find_not_found_is_a_value() {
        let db = MockDb::default();
        let mut user = users_record();
        let found = user.eq("id", 999).find(&db).await.unwrap();
        assert!(!found);
        assert_eq!(user.get("id"), None);
    }

    #[tokio::test]
    async fn test_find_all_returns_one_record_per_row() {
        let rows: Vec<Row> = vec![
            indexmap! {
                "id".to_string() => Value::I64(1),
                "name".to_string() => Value::from("Vasya"),
            },
            indexmap! {
                "id".to_string() => Value::I64(2),
                "name".to_string() => Value::from("Fedya"),
            },
        ];
        let db = MockDb::with_rows(rows);
        let mut user = users_record();
        let users = user.gt("id", 0).find_all(&db).await.unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[0].get("name"), Some(&Value::from("Vasya")));
        assert_eq!(users[1].get("name"), Some(&Value::from("Fedya")));
        assert!(users[0].changed_attributes().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_building_state() {
        let db = MockDb::failing();
        let mut user = users_record();
        user.set("name", "Vasya").unwrap();
        let err = user.insert(&db).await.unwrap_err();
        assert!(matches!(err, Error::Statement { .. }));
        // attributes untouched, statement state still pending
        assert_eq!(user.get("name"), Some(&Value::from("Vasya")));
        assert!(!user.bindings().is_empty());
        assert_eq!(user.changed_attributes().len(), 1);
    }

    #[test]
    fn test_with_primary_key_validates_column() {
        let user = users_record().with_primary_key("login").unwrap();
        assert_eq!(user.primary_key(), "login");

        let err = users_record().with_primary_key("uuid").unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound { .. }));
    }
}
