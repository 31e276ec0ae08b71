//! Statement catalogue.
//!
//! Every operation is addressed by a [`StatementTag`]. The registry is built
//! once from a [`SchemaStrategy`] and maps each tag to one statement, or to
//! one statement per mirror table for writes under the denormalized layout.

use std::collections::HashMap;
use std::fmt;

use crate::connection::CqlConnection;
use crate::schema::{
    lease_columns, LeaseKind, Lookup, SchemaStrategy, TableLayout, SCHEMA_VERSION_TABLE,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementTag(&'static str);

impl StatementTag {
    pub const INSERT_LEASE4: Self = Self("INSERT_LEASE4");
    pub const UPDATE_LEASE4: Self = Self("UPDATE_LEASE4");
    pub const DELETE_LEASE4: Self = Self("DELETE_LEASE4");
    pub const GET_LEASE4_EXPIRE: Self = Self("GET_LEASE4_EXPIRE");
    pub const GET_LEASE4: Self = Self("GET_LEASE4");
    pub const GET_LEASE4_ADDR: Self = Self("GET_LEASE4_ADDR");
    pub const GET_LEASE4_CLIENTID: Self = Self("GET_LEASE4_CLIENTID");
    pub const GET_LEASE4_CLIENTID_SUBID: Self = Self("GET_LEASE4_CLIENTID_SUBID");
    pub const GET_LEASE4_HWADDR: Self = Self("GET_LEASE4_HWADDR");
    pub const GET_LEASE4_HWADDR_SUBID: Self = Self("GET_LEASE4_HWADDR_SUBID");
    pub const GET_LEASE4_SUBID: Self = Self("GET_LEASE4_SUBID");
    pub const GET_LEASE4_HOSTNAME: Self = Self("GET_LEASE4_HOSTNAME");
    pub const GET_LEASE4_LIMIT: Self = Self("GET_LEASE4_LIMIT");
    pub const GET_LEASE4_PAGE: Self = Self("GET_LEASE4_PAGE");
    pub const ALL_LEASE4_STATS: Self = Self("ALL_LEASE4_STATS");
    pub const SUBNET_LEASE4_STATS: Self = Self("SUBNET_LEASE4_STATS");
    pub const SUBNET_RANGE_LEASE4_STATS: Self = Self("SUBNET_RANGE_LEASE4_STATS");

    pub const INSERT_LEASE6: Self = Self("INSERT_LEASE6");
    pub const UPDATE_LEASE6: Self = Self("UPDATE_LEASE6");
    pub const DELETE_LEASE6: Self = Self("DELETE_LEASE6");
    pub const GET_LEASE6_EXPIRE: Self = Self("GET_LEASE6_EXPIRE");
    pub const GET_LEASE6: Self = Self("GET_LEASE6");
    pub const GET_LEASE6_ADDR: Self = Self("GET_LEASE6_ADDR");
    pub const GET_LEASE6_DUID: Self = Self("GET_LEASE6_DUID");
    pub const GET_LEASE6_DUID_IAID: Self = Self("GET_LEASE6_DUID_IAID");
    pub const GET_LEASE6_DUID_IAID_SUBID: Self = Self("GET_LEASE6_DUID_IAID_SUBID");
    pub const GET_LEASE6_SUBID: Self = Self("GET_LEASE6_SUBID");
    pub const GET_LEASE6_HOSTNAME: Self = Self("GET_LEASE6_HOSTNAME");
    pub const GET_LEASE6_LIMIT: Self = Self("GET_LEASE6_LIMIT");
    pub const GET_LEASE6_PAGE: Self = Self("GET_LEASE6_PAGE");
    pub const ALL_LEASE6_STATS: Self = Self("ALL_LEASE6_STATS");
    pub const SUBNET_LEASE6_STATS: Self = Self("SUBNET_LEASE6_STATS");
    pub const SUBNET_RANGE_LEASE6_STATS: Self = Self("SUBNET_RANGE_LEASE6_STATS");

    pub const GET_VERSION: Self = Self("GET_VERSION");

    /// Ad-hoc tag; only useful for probing the registry.
    pub const fn custom(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StatementTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Lt,
    Ge,
    Le,
}

impl Comparison {
    fn operator(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Lt => "<",
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// `column <op> ?`
    Compare {
        column: &'static str,
        op: Comparison,
    },
    /// `TOKEN(k1, ..) > TOKEN(?, ..)` over a whole partition key, one
    /// parameter per key column. Partition token order, not value order.
    TokenAfter(&'static [&'static str]),
}

impl Predicate {
    fn equals(column: &'static str) -> Self {
        Self::compare(column, Comparison::Eq)
    }

    fn compare(column: &'static str, op: Comparison) -> Self {
        Predicate::Compare { column, op }
    }

    /// Column bound by an equality test, if this is one.
    pub fn equality_column(&self) -> Option<&'static str> {
        match self {
            Predicate::Compare {
                column,
                op: Comparison::Eq,
            } => Some(*column),
            _ => None,
        }
    }

    pub fn params(&self) -> usize {
        match self {
            Predicate::Compare { .. } => 1,
            Predicate::TokenAfter(key) => key.len(),
        }
    }

    fn render(&self) -> String {
        match self {
            Predicate::Compare { column, op } => format!("{column} {} ?", op.operator()),
            Predicate::TokenAfter(key) => format!(
                "TOKEN({}) > TOKEN({})",
                key.join(", "),
                vec!["?"; key.len()].join(", ")
            ),
        }
    }
}

/// Structured shape of a statement. Parameters are positional, in this
/// order:
/// - insert: `columns`
/// - update: `set`, then `key`, then the expected expiration if conditional
/// - delete: `key`, then the expected expiration if conditional
/// - select: the parameters of each `filter` predicate, then the row limit
///   if limited
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Insert {
        columns: Vec<&'static str>,
        if_not_exists: bool,
    },
    Update {
        set: Vec<&'static str>,
        key: Vec<&'static str>,
        if_expire: bool,
    },
    Delete {
        key: Vec<&'static str>,
        if_expire: bool,
    },
    Select {
        columns: Vec<&'static str>,
        filter: Vec<Predicate>,
        limit: bool,
        allow_filtering: bool,
    },
}

impl StatementKind {
    pub fn is_write(&self) -> bool {
        !matches!(self, StatementKind::Select { .. })
    }

    pub fn is_conditional(&self) -> bool {
        match self {
            StatementKind::Insert { if_not_exists, .. } => *if_not_exists,
            StatementKind::Update { if_expire, .. } | StatementKind::Delete { if_expire, .. } => {
                *if_expire
            }
            StatementKind::Select { .. } => false,
        }
    }
}

/// One prepared statement against one physical table.
#[derive(Clone, Debug)]
pub struct Statement {
    id: String,
    tag: StatementTag,
    table: &'static TableLayout,
    kind: StatementKind,
    transactional: bool,
    cql: String,
}

impl Statement {
    fn new(
        tag: StatementTag,
        table: &'static TableLayout,
        kind: StatementKind,
        transactional: bool,
        mirror: bool,
    ) -> Self {
        let id = if mirror {
            format!("{}@{}", tag.name(), table.name)
        } else {
            tag.name().to_string()
        };
        let transactional = transactional && kind.is_write();
        let cql = render_cql(table, &kind, transactional);
        Self {
            id,
            tag,
            table,
            kind,
            transactional,
            cql,
        }
    }

    /// Unique key in the connection's prepared-statement cache.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tag(&self) -> StatementTag {
        self.tag
    }

    pub fn table(&self) -> &'static TableLayout {
        self.table
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn transactional(&self) -> bool {
        self.transactional
    }

    pub fn cql(&self) -> &str {
        &self.cql
    }

    /// Columns a select fills, in row order. Empty for writes.
    pub fn select_columns(&self) -> &[&'static str] {
        match &self.kind {
            StatementKind::Select { columns, .. } => columns,
            _ => &[],
        }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn key_clause(key: &[&'static str]) -> String {
    key.iter()
        .map(|c| format!("{c} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn render_cql(table: &TableLayout, kind: &StatementKind, transactional: bool) -> String {
    let body = match kind {
        StatementKind::Insert {
            columns,
            if_not_exists,
        } => {
            let mut s = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.name,
                columns.join(", "),
                placeholders(columns.len())
            );
            if *if_not_exists {
                s.push_str(" IF NOT EXISTS");
            }
            s
        }
        StatementKind::Update {
            set,
            key,
            if_expire,
        } => {
            let assignments = set
                .iter()
                .map(|c| format!("{c} = ?"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut s = format!(
                "UPDATE {} SET {} WHERE {}",
                table.name,
                assignments,
                key_clause(key)
            );
            if *if_expire {
                s.push_str(" IF expire = ?");
            }
            s
        }
        StatementKind::Delete { key, if_expire } => {
            let mut s = format!("DELETE FROM {} WHERE {}", table.name, key_clause(key));
            if *if_expire {
                s.push_str(" IF expire = ?");
            }
            s
        }
        StatementKind::Select {
            columns,
            filter,
            limit,
            allow_filtering,
        } => {
            let mut s = format!("SELECT {} FROM {}", columns.join(", "), table.name);
            if !filter.is_empty() {
                let preds = filter
                    .iter()
                    .map(Predicate::render)
                    .collect::<Vec<_>>()
                    .join(" AND ");
                s.push_str(" WHERE ");
                s.push_str(&preds);
            }
            if *limit {
                s.push_str(" LIMIT ?");
            }
            if *allow_filtering {
                s.push_str(" ALLOW FILTERING");
            }
            s
        }
    };
    if transactional {
        format!("BEGIN TRANSACTION {body} COMMIT TRANSACTION")
    } else {
        body
    }
}

/// Runtime switches that change the rendered statements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryOptions {
    pub privacy_extension: bool,
    pub transactional_writes: bool,
}

/// Immutable statement catalogue owned by a lease store.
#[derive(Debug)]
pub struct StatementRegistry {
    strategy: Box<dyn SchemaStrategy>,
    options: RegistryOptions,
    entries: HashMap<StatementTag, Vec<Statement>>,
}

struct KindTags {
    insert: StatementTag,
    update: StatementTag,
    delete: StatementTag,
    expire: StatementTag,
    all: StatementTag,
    limit: StatementTag,
    page: StatementTag,
    stats_all: StatementTag,
    stats_subnet: StatementTag,
    stats_range: StatementTag,
}

const V4_TAGS: KindTags = KindTags {
    insert: StatementTag::INSERT_LEASE4,
    update: StatementTag::UPDATE_LEASE4,
    delete: StatementTag::DELETE_LEASE4,
    expire: StatementTag::GET_LEASE4_EXPIRE,
    all: StatementTag::GET_LEASE4,
    limit: StatementTag::GET_LEASE4_LIMIT,
    page: StatementTag::GET_LEASE4_PAGE,
    stats_all: StatementTag::ALL_LEASE4_STATS,
    stats_subnet: StatementTag::SUBNET_LEASE4_STATS,
    stats_range: StatementTag::SUBNET_RANGE_LEASE4_STATS,
};

const V6_TAGS: KindTags = KindTags {
    insert: StatementTag::INSERT_LEASE6,
    update: StatementTag::UPDATE_LEASE6,
    delete: StatementTag::DELETE_LEASE6,
    expire: StatementTag::GET_LEASE6_EXPIRE,
    all: StatementTag::GET_LEASE6,
    limit: StatementTag::GET_LEASE6_LIMIT,
    page: StatementTag::GET_LEASE6_PAGE,
    stats_all: StatementTag::ALL_LEASE6_STATS,
    stats_subnet: StatementTag::SUBNET_LEASE6_STATS,
    stats_range: StatementTag::SUBNET_RANGE_LEASE6_STATS,
};

type LookupEntry = (StatementTag, Lookup, &'static [&'static str]);

const V4_LOOKUPS: &[LookupEntry] = &[
    (StatementTag::GET_LEASE4_ADDR, Lookup::Address, &["address"]),
    (StatementTag::GET_LEASE4_CLIENTID, Lookup::ClientId, &["client_id"]),
    (
        StatementTag::GET_LEASE4_CLIENTID_SUBID,
        Lookup::ClientIdSubnet,
        &["client_id", "subnet_id"],
    ),
    (StatementTag::GET_LEASE4_HWADDR, Lookup::HwAddr, &["hwaddr"]),
    (
        StatementTag::GET_LEASE4_HWADDR_SUBID,
        Lookup::HwAddrSubnet,
        &["hwaddr", "subnet_id"],
    ),
    (StatementTag::GET_LEASE4_SUBID, Lookup::Subnet, &["subnet_id"]),
    (StatementTag::GET_LEASE4_HOSTNAME, Lookup::Hostname, &["hostname"]),
];

const V6_LOOKUPS: &[LookupEntry] = &[
    (
        StatementTag::GET_LEASE6_ADDR,
        Lookup::Address,
        &["address", "lease_type"],
    ),
    (StatementTag::GET_LEASE6_DUID, Lookup::Duid, &["duid"]),
    (
        StatementTag::GET_LEASE6_DUID_IAID,
        Lookup::DuidIaid,
        &["duid", "iaid", "lease_type"],
    ),
    (
        StatementTag::GET_LEASE6_DUID_IAID_SUBID,
        Lookup::DuidIaidSubnet,
        &["duid", "iaid", "lease_type", "subnet_id"],
    ),
    (StatementTag::GET_LEASE6_SUBID, Lookup::Subnet, &["subnet_id"]),
    (StatementTag::GET_LEASE6_HOSTNAME, Lookup::Hostname, &["hostname"]),
];

impl StatementRegistry {
    pub fn build(strategy: Box<dyn SchemaStrategy>, options: RegistryOptions) -> Self {
        let mut registry = Self {
            strategy,
            options,
            entries: HashMap::new(),
        };
        registry.register_kind(LeaseKind::V4, &V4_TAGS);
        registry.register_kind(LeaseKind::V6, &V6_TAGS);

        for &(tag, lookup, key) in V4_LOOKUPS {
            registry.register_lookup(LeaseKind::V4, tag, lookup, key);
        }
        for &(tag, lookup, key) in V6_LOOKUPS {
            registry.register_lookup(LeaseKind::V6, tag, lookup, key);
        }

        registry.insert_one(Statement::new(
            StatementTag::GET_VERSION,
            &SCHEMA_VERSION_TABLE,
            StatementKind::Select {
                columns: vec!["version", "minor"],
                filter: Vec::new(),
                limit: false,
                allow_filtering: false,
            },
            false,
            false,
        ));
        registry
    }

    fn insert_one(&mut self, statement: Statement) {
        self.entries.insert(statement.tag(), vec![statement]);
    }

    fn register_kind(&mut self, kind: LeaseKind, tags: &KindTags) {
        let columns = lease_columns(kind, self.options.privacy_extension);
        let tx = self.options.transactional_writes;
        let tables = self.strategy.tables(kind);

        let mut inserts = Vec::with_capacity(tables.len());
        let mut updates = Vec::with_capacity(tables.len());
        let mut deletes = Vec::with_capacity(tables.len());
        for (idx, &table) in tables.iter().enumerate() {
            let mirror = idx > 0;
            let key: Vec<&'static str> = table.primary_key().collect();
            let set: Vec<&'static str> = columns
                .iter()
                .copied()
                .filter(|c| !table.is_key_column(c))
                .collect();
            inserts.push(Statement::new(
                tags.insert,
                table,
                StatementKind::Insert {
                    columns: columns.clone(),
                    if_not_exists: true,
                },
                tx,
                mirror,
            ));
            // Mirrors are refreshed unconditionally once the primary row's
            // compare-and-set has been applied.
            updates.push(Statement::new(
                tags.update,
                table,
                StatementKind::Update {
                    set,
                    key: key.clone(),
                    if_expire: !mirror,
                },
                tx,
                mirror,
            ));
            deletes.push(Statement::new(
                tags.delete,
                table,
                StatementKind::Delete {
                    key,
                    if_expire: !mirror,
                },
                tx,
                mirror,
            ));
        }
        self.entries.insert(tags.insert, inserts);
        self.entries.insert(tags.update, updates);
        self.entries.insert(tags.delete, deletes);

        let primary = self.strategy.primary_table(kind);
        let select = |filter: Vec<Predicate>, limit: bool, allow_filtering: bool| {
            StatementKind::Select {
                columns: columns.clone(),
                filter,
                limit,
                allow_filtering,
            }
        };
        let expire = Statement::new(
            tags.expire,
            primary,
            select(
                vec![
                    Predicate::equals("state"),
                    Predicate::compare("expire", Comparison::Lt),
                ],
                true,
                true,
            ),
            false,
            false,
        );
        let all = Statement::new(
            tags.all,
            primary,
            select(Vec::new(), false, false),
            false,
            false,
        );
        let limit = Statement::new(
            tags.limit,
            primary,
            select(Vec::new(), true, false),
            false,
            false,
        );
        let page = Statement::new(
            tags.page,
            primary,
            select(
                vec![Predicate::TokenAfter(primary.partition_key)],
                true,
                false,
            ),
            false,
            false,
        );
        for statement in [expire, all, limit, page] {
            self.insert_one(statement);
        }

        let stats_columns: Vec<&'static str> = match kind {
            LeaseKind::V4 => vec!["subnet_id", "state"],
            LeaseKind::V6 => vec!["subnet_id", "lease_type", "state"],
        };
        let stats = |tag, filter: Vec<Predicate>| {
            let allow_filtering = !filter.is_empty();
            Statement::new(
                tag,
                primary,
                StatementKind::Select {
                    columns: stats_columns.clone(),
                    filter,
                    limit: false,
                    allow_filtering,
                },
                false,
                false,
            )
        };
        let stats_all = stats(tags.stats_all, Vec::new());
        let stats_subnet = stats(tags.stats_subnet, vec![Predicate::equals("subnet_id")]);
        let stats_range = stats(
            tags.stats_range,
            vec![
                Predicate::compare("subnet_id", Comparison::Ge),
                Predicate::compare("subnet_id", Comparison::Le),
            ],
        );
        for statement in [stats_all, stats_subnet, stats_range] {
            self.insert_one(statement);
        }
    }

    fn register_lookup(
        &mut self,
        kind: LeaseKind,
        tag: StatementTag,
        lookup: Lookup,
        key: &'static [&'static str],
    ) {
        let (table, allow_filtering) = match self.strategy.lookup_table(kind, lookup) {
            Some(table) => (table, false),
            None => (self.strategy.primary_table(kind), true),
        };
        let statement = Statement::new(
            tag,
            table,
            StatementKind::Select {
                columns: lease_columns(kind, self.options.privacy_extension),
                filter: key.iter().map(|&c| Predicate::equals(c)).collect(),
                limit: false,
                allow_filtering,
            },
            false,
            false,
        );
        self.insert_one(statement);
    }

    pub fn strategy(&self) -> &dyn SchemaStrategy {
        self.strategy.as_ref()
    }

    pub fn options(&self) -> RegistryOptions {
        self.options
    }

    /// All statements behind `tag`, primary table first.
    ///
    /// # Panics
    ///
    /// Panics if `tag` was never registered; tags are fixed at build time so
    /// this indicates a programming error.
    pub fn statements(&self, tag: StatementTag) -> &[Statement] {
        match self.entries.get(&tag) {
            Some(statements) => statements,
            None => panic!("statement tag {tag} is not registered"),
        }
    }

    /// Statement against the primary table for `tag`.
    pub fn primary(&self, tag: StatementTag) -> &Statement {
        &self.statements(tag)[0]
    }

    /// Statements against mirror tables for `tag`; empty for the
    /// consolidated layout and for reads.
    pub fn mirrors(&self, tag: StatementTag) -> &[Statement] {
        &self.statements(tag)[1..]
    }

    /// Statement for `tag` against a specific table.
    pub fn for_table(&self, tag: StatementTag, table: &TableLayout) -> Option<&Statement> {
        self.statements(tag)
            .iter()
            .find(|s| s.table().name == table.name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Statement> {
        self.entries.values().flatten()
    }

    /// Registers every statement with the connection's prepared-statement
    /// cache.
    pub fn prepare_all(&self, conn: &dyn CqlConnection) -> anyhow::Result<()> {
        let mut statements: Vec<&Statement> = self.iter().collect();
        statements.sort_by(|a, b| a.id().cmp(b.id()));
        for statement in statements {
            conn.prepare(statement)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{strategy_for, SchemaStrategyKind};

    fn registry(kind: SchemaStrategyKind, options: RegistryOptions) -> StatementRegistry {
        StatementRegistry::build(strategy_for(kind), options)
    }

    #[test]
    fn consolidated_writes_are_single_conditional_statements() {
        let r = registry(SchemaStrategyKind::Consolidated, RegistryOptions::default());
        assert_eq!(r.statements(StatementTag::INSERT_LEASE4).len(), 1);
        assert!(r.mirrors(StatementTag::UPDATE_LEASE6).is_empty());
        let update = r.primary(StatementTag::UPDATE_LEASE4);
        let set = "UPDATE lease4 SET hwaddr = ?, hwtype = ?, hwaddr_source = ?, client_id = ?";
        assert!(update.cql().starts_with(set));
        assert!(update.cql().ends_with("WHERE address = ? IF expire = ?"));
        assert_eq!(
            r.primary(StatementTag::DELETE_LEASE6).cql(),
            "DELETE FROM lease6 WHERE address = ? AND lease_type = ? IF expire = ?"
        );
        assert!(r
            .primary(StatementTag::INSERT_LEASE4)
            .cql()
            .ends_with("IF NOT EXISTS"));
    }

    #[test]
    fn consolidated_secondary_lookups_scan_with_filtering() {
        let r = registry(SchemaStrategyKind::Consolidated, RegistryOptions::default());
        let hw = r.primary(StatementTag::GET_LEASE4_HWADDR_SUBID);
        assert_eq!(hw.table().name, "lease4");
        assert!(hw
            .cql()
            .ends_with("FROM lease4 WHERE hwaddr = ? AND subnet_id = ? ALLOW FILTERING"));
        let addr = r.primary(StatementTag::GET_LEASE4_ADDR);
        assert!(addr.cql().ends_with("FROM lease4 WHERE address = ?"));
    }

    #[test]
    fn page_and_stats_statements_have_expected_shape() {
        let r = registry(SchemaStrategyKind::Consolidated, RegistryOptions::default());
        assert!(r
            .primary(StatementTag::GET_LEASE4_PAGE)
            .cql()
            .ends_with("FROM lease4 WHERE TOKEN(address) > TOKEN(?) LIMIT ?"));
        assert!(r
            .primary(StatementTag::GET_LEASE6_PAGE)
            .cql()
            .ends_with("FROM lease6 WHERE TOKEN(address, lease_type) > TOKEN(?, ?) LIMIT ?"));
        assert_eq!(
            r.primary(StatementTag::ALL_LEASE4_STATS).cql(),
            "SELECT subnet_id, state FROM lease4"
        );
        assert_eq!(
            r.primary(StatementTag::SUBNET_RANGE_LEASE6_STATS).cql(),
            "SELECT subnet_id, lease_type, state FROM lease6 \
             WHERE subnet_id >= ? AND subnet_id <= ? ALLOW FILTERING"
        );
        assert!(r
            .primary(StatementTag::GET_LEASE6_EXPIRE)
            .cql()
            .ends_with("WHERE state = ? AND expire < ? LIMIT ? ALLOW FILTERING"));
    }

    #[test]
    fn denormalized_writes_fan_out_in_table_order() {
        let r = registry(SchemaStrategyKind::Denormalized, RegistryOptions::default());
        let inserts = r.statements(StatementTag::INSERT_LEASE4);
        let tables: Vec<_> = inserts.iter().map(|s| s.table().name).collect();
        assert_eq!(
            tables,
            vec!["lease4", "lease4_client_id", "lease4_hwaddr", "lease4_subnet"]
        );
        assert_eq!(inserts[2].id(), "INSERT_LEASE4@lease4_hwaddr");
        let updates = r.statements(StatementTag::UPDATE_LEASE4);
        assert!(updates[0].kind().is_conditional());
        assert!(updates[1..].iter().all(|s| !s.kind().is_conditional()));
        assert_eq!(
            r.mirrors(StatementTag::DELETE_LEASE4)[0].cql(),
            "DELETE FROM lease4_client_id WHERE client_id = ? AND subnet_id = ? AND address = ?"
        );
        assert_eq!(
            r.primary(StatementTag::GET_LEASE4_CLIENTID).table().name,
            "lease4_client_id"
        );
        assert_eq!(r.primary(StatementTag::GET_LEASE6_DUID_IAID).table().name, "lease6_duid");
        assert!(!r.primary(StatementTag::GET_LEASE6_DUID_IAID).cql().contains("ALLOW FILTERING"));
    }

    #[test]
    fn statement_ids_are_unique() {
        let r = registry(SchemaStrategyKind::Denormalized, RegistryOptions::default());
        let mut ids: Vec<_> = r.iter().map(|s| s.id().to_string()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn runtime_switches_change_rendered_statements() {
        let r = registry(
            SchemaStrategyKind::Consolidated,
            RegistryOptions {
                privacy_extension: true,
                transactional_writes: true,
            },
        );
        let insert = r.primary(StatementTag::INSERT_LEASE4);
        assert!(insert.transactional());
        assert!(insert.cql().starts_with("BEGIN TRANSACTION INSERT INTO lease4"));
        assert!(insert.cql().contains("privacy_hash"));
        let select = r.primary(StatementTag::GET_LEASE4_ADDR);
        assert!(!select.transactional());
        assert!(select.select_columns().contains(&"privacy_history"));
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn unknown_tag_panics() {
        let r = registry(SchemaStrategyKind::Consolidated, RegistryOptions::default());
        r.statements(StatementTag::custom("DROP_EVERYTHING"));
    }
}
