//! In-process, MySQL-flavoured database catalog.
//!
//! [`MemoryDatabase`] keeps tables (name and ordered column list) and views
//! (name and definition text). [`MemoryConnection`] is one session on it and
//! understands the statement subset the view generator emits:
//!
//! - `CREATE [OR REPLACE] VIEW <name> AS ...`
//! - `DROP VIEW [IF EXISTS] <name>[, <name>...]`
//! - `SET SESSION <variable> = <number>`
//! - `START TRANSACTION` / `COMMIT` / `ROLLBACK`
//! - `SELECT <column> FROM INFORMATION_SCHEMA.{TABLES|COLUMNS|VIEWS}
//!    WHERE <column> {=|LIKE} {?|'literal'} [AND ...] [ORDER BY <column>]`
//!
//! Statements are tokenized with `sqlparser`'s MySQL dialect, so quoting and
//! escaping follow MySQL rules. Unlike MySQL, DDL is transactional here:
//! `ROLLBACK` puts back every view the session created, replaced or dropped
//! since `START TRANSACTION`. Views other sessions touched are left alone.

use super::{Connection, Driver};
use crate::core::{Result, ViewError};
use crate::expression::eval_like;
use async_trait::async_trait;
use sqlparser::dialect::MySqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Tables and views of one database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryCatalog {
    tables: BTreeMap<String, Vec<String>>,
    views: BTreeMap<String, String>,
}

impl MemoryCatalog {
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn view_exists(&self, name: &str) -> bool {
        self.views.contains_key(name)
    }

    pub fn relation_exists(&self, name: &str) -> bool {
        self.table_exists(name) || self.view_exists(name)
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn get_view(&self, name: &str) -> Option<&str> {
        self.views.get(name).map(String::as_str)
    }

    pub fn list_tables(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn list_views(&self) -> Vec<&str> {
        self.views.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Default)]
struct Shared {
    catalog: MemoryCatalog,
    statements: Vec<String>,
    failures: Vec<String>,
    /// lock name -> owning session
    locks: HashMap<String, u64>,
    next_session: u64,
}

/// A named in-memory database. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    name: String,
    driver: Driver,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryDatabase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            driver: Driver::MySql,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Report a different driver family from every session
    pub fn with_driver(mut self, driver: Driver) -> Self {
        self.driver = driver;
        self
    }

    /// Add (or redefine) a base table
    pub fn with_table(self, name: &str, columns: &[&str]) -> Self {
        self.create_table(name, columns);
        self
    }

    pub fn create_table(&self, name: &str, columns: &[&str]) {
        self.state()
            .catalog
            .tables
            .insert(name.to_string(), columns.iter().map(|c| c.to_string()).collect());
    }

    pub fn drop_table(&self, name: &str) {
        self.state().catalog.tables.remove(name);
    }

    /// Open a new session
    pub fn connect(&self) -> MemoryConnection {
        let session_id = {
            let mut shared = self.state();
            shared.next_session += 1;
            shared.next_session
        };
        MemoryConnection {
            db: self.clone(),
            session_id,
            session: Mutex::new(Session::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make every statement containing `fragment` fail
    pub fn fail_on(&self, fragment: &str) {
        self.state().failures.push(fragment.to_string());
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Every statement received so far, in order, including failed ones
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub fn clear_statements(&self) {
        self.state().statements.clear();
    }

    pub fn catalog(&self) -> MemoryCatalog {
        self.state().catalog.clone()
    }

    /// Sorted view names
    pub fn views(&self) -> Vec<String> {
        self.state().catalog.views.keys().cloned().collect()
    }

    pub fn has_view(&self, name: &str) -> bool {
        self.state().catalog.view_exists(name)
    }

    pub fn view_definition(&self, name: &str) -> Option<String> {
        self.state().catalog.get_view(name).map(str::to_string)
    }

    fn state(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, sql: &str) -> Result<()> {
        let mut shared = self.state();
        shared.statements.push(sql.to_string());
        if let Some(fragment) = shared.failures.iter().find(|f| sql.contains(f.as_str())) {
            return Err(ViewError::Database(format!(
                "Injected failure on statement containing '{}'",
                fragment
            )));
        }
        Ok(())
    }

    /// Returns the replaced definition, if any.
    fn create_view(
        &self,
        name: &str,
        definition: &str,
        or_replace: bool,
        references: &[String],
    ) -> Result<Option<String>> {
        let mut shared = self.state();
        let catalog = &mut shared.catalog;

        if catalog.table_exists(name) || (!or_replace && catalog.view_exists(name)) {
            return Err(ViewError::Database(format!("Table '{}' already exists", name)));
        }
        if let Some(missing) = references.iter().find(|r| !catalog.relation_exists(r)) {
            return Err(ViewError::Database(format!(
                "Table '{}.{}' doesn't exist",
                self.name, missing
            )));
        }

        Ok(catalog.views.insert(name.to_string(), definition.to_string()))
    }

    /// Returns the dropped definitions in statement order.
    fn drop_views(&self, names: &[String], if_exists: bool) -> Result<Vec<(String, Option<String>)>> {
        let mut shared = self.state();
        let catalog = &mut shared.catalog;

        if !if_exists {
            if let Some(missing) = names.iter().find(|n| !catalog.view_exists(n)) {
                return Err(ViewError::Database(format!(
                    "Unknown table '{}.{}'",
                    self.name, missing
                )));
            }
        }
        Ok(names
            .iter()
            .map(|name| (name.clone(), catalog.views.remove(name)))
            .collect())
    }

    /// Put views back as an undo log recorded them
    fn restore_views(&self, undo: UndoLog) {
        let mut shared = self.state();
        for (name, definition) in undo {
            match definition {
                Some(definition) => shared.catalog.views.insert(name, definition),
                None => shared.catalog.views.remove(&name),
            };
        }
    }

    fn information_schema(&self, relation: &str) -> Result<Vec<BTreeMap<&'static str, String>>> {
        let shared = self.state();
        let catalog = &shared.catalog;
        let schema = || self.name.clone();

        let rows = match relation {
            "TABLES" => catalog
                .tables
                .keys()
                .map(|t| (t, "BASE TABLE"))
                .chain(catalog.views.keys().map(|v| (v, "VIEW")))
                .map(|(name, kind)| {
                    BTreeMap::from([
                        ("TABLE_SCHEMA", schema()),
                        ("TABLE_NAME", name.clone()),
                        ("TABLE_TYPE", kind.to_string()),
                    ])
                })
                .collect(),
            "COLUMNS" => catalog
                .tables
                .iter()
                .flat_map(|(table, columns)| {
                    columns.iter().enumerate().map(move |(i, column)| (table, i + 1, column))
                })
                .map(|(table, position, column)| {
                    BTreeMap::from([
                        ("TABLE_SCHEMA", schema()),
                        ("TABLE_NAME", table.clone()),
                        ("COLUMN_NAME", column.clone()),
                        ("ORDINAL_POSITION", position.to_string()),
                    ])
                })
                .collect(),
            "VIEWS" => catalog
                .views
                .iter()
                .map(|(name, definition)| {
                    BTreeMap::from([
                        ("TABLE_SCHEMA", schema()),
                        ("TABLE_NAME", name.clone()),
                        ("VIEW_DEFINITION", definition.clone()),
                    ])
                })
                .collect(),
            other => {
                return Err(ViewError::Database(format!(
                    "Unknown table '{}' in information_schema",
                    other
                )));
            }
        };
        Ok(rows)
    }
}

/// View name -> definition before the transaction first touched it
type UndoLog = BTreeMap<String, Option<String>>;

#[derive(Debug, Default)]
struct Session {
    /// Undo log of the open transaction
    undo: Option<UndoLog>,
    variables: BTreeMap<String, u64>,
    held_locks: HashSet<String>,
}

/// One session on a [`MemoryDatabase`]
#[derive(Debug)]
pub struct MemoryConnection {
    db: MemoryDatabase,
    session_id: u64,
    session: Mutex<Session>,
}

impl MemoryConnection {
    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    pub fn session_variable(&self, name: &str) -> Option<u64> {
        self.session().variables.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn is_in_transaction(&self) -> bool {
        self.session().undo.is_some()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_transaction(&self) -> Result<()> {
        let mut session = self.session();
        if session.undo.is_some() {
            return Err(ViewError::Database("Transaction already active".into()));
        }
        session.undo = Some(UndoLog::new());
        Ok(())
    }

    fn finish_transaction(&self, restore: bool) -> Result<()> {
        let undo = self
            .session()
            .undo
            .take()
            .ok_or_else(|| ViewError::Database("No active transaction".into()))?;
        if restore {
            self.db.restore_views(undo);
        }
        Ok(())
    }

    /// Remember the first prior state of each view changed in a transaction
    fn remember(&self, changes: impl IntoIterator<Item = (String, Option<String>)>) {
        if let Some(undo) = self.session().undo.as_mut() {
            for (name, previous) in changes {
                undo.entry(name).or_insert(previous);
            }
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        // Session end: roll back and give up locks
        let (undo, held) = {
            let mut session = self.session();
            (session.undo.take(), std::mem::take(&mut session.held_locks))
        };
        if let Some(undo) = undo {
            self.db.restore_views(undo);
        }
        let mut shared = self.db.state();
        for name in held {
            shared.locks.remove(&name);
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn driver(&self) -> Driver {
        self.db.driver.clone()
    }

    fn database_name(&self) -> &str {
        &self.db.name
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.db.record(sql)?;
        let mut cursor = Cursor::new(sql)?;

        if cursor.eat_keywords(&["START", "TRANSACTION"]) || cursor.eat_keywords(&["BEGIN"]) {
            return self.begin_transaction();
        }
        if cursor.eat_keywords(&["COMMIT"]) {
            return self.finish_transaction(false);
        }
        if cursor.eat_keywords(&["ROLLBACK"]) {
            return self.finish_transaction(true);
        }

        if cursor.eat_keywords(&["CREATE"]) {
            let or_replace = cursor.eat_keywords(&["OR", "REPLACE"]);
            cursor.expect_keyword("VIEW")?;
            let name = cursor.parse_name()?;
            cursor.expect_keyword("AS")?;
            let references = cursor.referenced_relations()?;
            let previous = self.db.create_view(&name, sql, or_replace, &references)?;
            self.remember([(name, previous)]);
            return Ok(());
        }

        if cursor.eat_keywords(&["DROP"]) {
            cursor.expect_keyword("VIEW")?;
            let if_exists = cursor.eat_keywords(&["IF", "EXISTS"]);
            let mut names = vec![cursor.parse_name()?];
            while cursor.eat(&Token::Comma) {
                names.push(cursor.parse_name()?);
            }
            cursor.expect_end()?;
            let dropped = self.db.drop_views(&names, if_exists)?;
            self.remember(dropped);
            return Ok(());
        }

        if cursor.eat_keywords(&["SET"]) {
            cursor.eat_keywords(&["SESSION"]);
            let name = cursor.parse_name()?.to_ascii_lowercase();
            cursor.expect(&Token::Eq)?;
            let value = cursor.parse_number()?;
            cursor.expect_end()?;
            self.session().variables.insert(name, value);
            return Ok(());
        }

        Err(ViewError::Database(format!("Unsupported statement: {}", sql)))
    }

    async fn fetch_strings(&self, sql: &str, params: &[&str]) -> Result<Vec<String>> {
        self.db.record(sql)?;
        let query = CatalogQuery::parse(sql, params)?;
        let rows = self.db.information_schema(&query.relation)?;

        let column_of = |row: &BTreeMap<&'static str, String>, column: &str| -> Result<String> {
            row.get(column)
                .cloned()
                .ok_or_else(|| ViewError::Database(format!("Unknown column '{}'", column)))
        };

        let mut selected = Vec::new();
        for row in rows {
            let mut matches = true;
            for condition in &query.conditions {
                let value = column_of(&row, &condition.column)?;
                let hit = if condition.like {
                    eval_like(&value, &condition.value, true)?
                } else {
                    value == condition.value
                };
                if !hit {
                    matches = false;
                    break;
                }
            }
            if matches {
                let sort_key = match &query.order_by {
                    Some(column) => Some(column_of(&row, column)?),
                    None => None,
                };
                selected.push((sort_key, column_of(&row, &query.column)?));
            }
        }

        if query.order_by.is_some() {
            selected.sort_by(|(a, _), (b, _)| compare_sort_keys(a.as_deref(), b.as_deref()));
        }
        Ok(selected.into_iter().map(|(_, value)| value).collect())
    }

    async fn begin(&self) -> Result<()> {
        self.execute("START TRANSACTION").await
    }

    async fn commit(&self) -> Result<()> {
        self.execute("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK").await
    }

    async fn try_advisory_lock(&self, name: &str, timeout: Duration) -> Result<bool> {
        let started = Instant::now();
        loop {
            {
                let mut shared = self.db.state();
                let owner = shared.locks.get(name).copied();
                if owner.is_none() || owner == Some(self.session_id) {
                    shared.locks.insert(name.to_string(), self.session_id);
                    self.session().held_locks.insert(name.to_string());
                    return Ok(true);
                }
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn release_advisory_lock(&self, name: &str) -> Result<()> {
        let mut shared = self.db.state();
        if shared.locks.get(name) == Some(&self.session_id) {
            shared.locks.remove(name);
        }
        self.session().held_locks.remove(name);
        Ok(())
    }
}

/// Numeric keys (ORDINAL_POSITION) sort numerically, others lexically.
fn compare_sort_keys(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        },
        (a, b) => a.cmp(&b),
    }
}

struct Condition {
    column: String,
    like: bool,
    value: String,
}

/// `SELECT <col> FROM INFORMATION_SCHEMA.<relation> [WHERE ...] [ORDER BY <col>]`
struct CatalogQuery {
    column: String,
    relation: String,
    conditions: Vec<Condition>,
    order_by: Option<String>,
}

impl CatalogQuery {
    fn parse(sql: &str, params: &[&str]) -> Result<Self> {
        let mut cursor = Cursor::new(sql)?;
        let mut params = params.iter();

        cursor.expect_keyword("SELECT")?;
        let column = cursor.parse_name()?.to_ascii_uppercase();
        cursor.expect_keyword("FROM")?;

        let parts = cursor.parse_object_name()?;
        let relation = match parts.as_slice() {
            [schema, relation] if schema.eq_ignore_ascii_case("INFORMATION_SCHEMA") => {
                relation.to_ascii_uppercase()
            }
            _ => {
                return Err(ViewError::Database(format!(
                    "Only INFORMATION_SCHEMA queries are supported: {}",
                    sql
                )));
            }
        };

        let mut conditions = Vec::new();
        if cursor.eat_keywords(&["WHERE"]) {
            loop {
                let column = cursor.parse_name()?.to_ascii_uppercase();
                let like = if cursor.eat(&Token::Eq) {
                    false
                } else {
                    cursor.expect_keyword("LIKE")?;
                    true
                };
                let value = match cursor.next() {
                    Some(Token::Placeholder(_)) => params
                        .next()
                        .map(|p| p.to_string())
                        .ok_or_else(|| ViewError::Database("Missing query parameter".into()))?,
                    Some(Token::SingleQuotedString(s)) => s,
                    Some(Token::Number(n, _)) => n,
                    other => {
                        return Err(ViewError::Parse(format!("Expected a value, found {:?}", other)));
                    }
                };
                conditions.push(Condition { column, like, value });
                if !cursor.eat_keywords(&["AND"]) {
                    break;
                }
            }
        }

        let order_by = if cursor.eat_keywords(&["ORDER", "BY"]) {
            Some(cursor.parse_name()?.to_ascii_uppercase())
        } else {
            None
        };
        cursor.expect_end()?;

        Ok(Self {
            column,
            relation,
            conditions,
            order_by,
        })
    }
}

/// Token stream without whitespace and comments
struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn new(sql: &str) -> Result<Self> {
        let dialect = MySqlDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| ViewError::Parse(e.to_string()))?
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_) | Token::SemiColon))
            .collect();
        Ok(Self { tokens, pos: 0 })
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn is_keyword(token: Option<&Token>, keyword: &str) -> bool {
        matches!(token, Some(Token::Word(w)) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(keyword))
    }

    /// Consume the whole keyword sequence, or nothing
    fn eat_keywords(&mut self, keywords: &[&str]) -> bool {
        let all = keywords
            .iter()
            .enumerate()
            .all(|(i, kw)| Self::is_keyword(self.peek_at(i), kw));
        if all {
            self.pos += keywords.len();
        }
        all
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keywords(&[keyword]) {
            Ok(())
        } else {
            Err(ViewError::Parse(format!(
                "Expected {}, found {:?}",
                keyword,
                self.peek_at(0)
            )))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek_at(0) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(ViewError::Parse(format!(
                "Expected {}, found {:?}",
                token,
                self.peek_at(0)
            )))
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek_at(0) {
            None => Ok(()),
            Some(token) => Err(ViewError::Parse(format!("Unexpected {:?}", token))),
        }
    }

    /// `a[.b[.c]]`
    fn parse_object_name(&mut self) -> Result<Vec<String>> {
        let mut parts = Vec::new();
        loop {
            match self.next() {
                Some(Token::Word(w)) => parts.push(w.value),
                other => {
                    return Err(ViewError::Parse(format!("Expected a name, found {:?}", other)));
                }
            }
            if !self.eat(&Token::Period) {
                return Ok(parts);
            }
        }
    }

    /// Unqualified name (last part of a qualified one)
    fn parse_name(&mut self) -> Result<String> {
        self.parse_object_name()?
            .pop()
            .ok_or_else(|| ViewError::Parse("Expected a name".into()))
    }

    fn parse_number(&mut self) -> Result<u64> {
        match self.next() {
            Some(Token::Number(n, _)) => n
                .parse()
                .map_err(|_| ViewError::Parse(format!("Invalid number '{}'", n))),
            other => Err(ViewError::Parse(format!("Expected a number, found {:?}", other))),
        }
    }

    /// Named relations following `FROM` or `JOIN` in the rest of the
    /// statement. Derived tables are skipped.
    fn referenced_relations(&mut self) -> Result<Vec<String>> {
        let mut relations = Vec::new();
        while let Some(token) = self.next() {
            let introduces_relation =
                Self::is_keyword(Some(&token), "FROM") || Self::is_keyword(Some(&token), "JOIN");
            if introduces_relation && matches!(self.peek_at(0), Some(Token::Word(_))) {
                relations.push(self.parse_name()?);
            }
        }
        Ok(relations)
    }
}
