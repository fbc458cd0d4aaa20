use crate::error::{SprigError, SprigResult};

/// A value bound into a query. In parameterized mode these are returned in
/// placeholder order; in inline mode they are escaped and spliced into the
/// SQL text.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl SqlValue {
    /// The escaped literal used by the inline (no-parameter) mode. Strings
    /// are single-quoted with embedded quotes doubled; this mode is for
    /// static/diagnostic SQL only, never untrusted input.
    fn inline(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(true) => "1".to_string(),
            Self::Bool(false) => "0".to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(n) => n.to_string(),
            Self::Str(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Joiner {
    And,
    Or,
}

impl Joiner {
    fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// One node of the WHERE tree: a leaf condition or a parenthesized group.
/// Each node carries the joiner that connects it to the node before it; the
/// first node at any level renders without one.
#[derive(Debug, Clone)]
enum WhereNode {
    Cond {
        joiner: Joiner,
        column: String,
        op: String,
        value: SqlValue,
    },
    Group {
        joiner: Joiner,
        nodes: Vec<WhereNode>,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

/// Fluent SQL assembly: chained calls accumulate clause state, and a
/// finalizer renders the SQL string. Finalizers take `&self` and may be
/// called repeatedly; the builder stays usable afterwards.
///
/// Values never reach the SQL text in parameterized mode — they come back as
/// a parallel parameter list. Clause order in the rendered string is fixed
/// (WHERE, GROUP BY, ORDER BY, LIMIT, OFFSET) regardless of call order.
///
/// # Examples
///
/// ```
/// use sprig::QueryBuilder;
///
/// let sql = QueryBuilder::table("users").where_("id", 1).get().unwrap();
/// assert_eq!(sql, "SELECT * FROM `users` WHERE `id` = 1");
/// ```
pub struct QueryBuilder {
    table: String,
    operation: Operation,
    columns: Vec<String>,
    assignments: Vec<(String, SqlValue)>,
    wheres: Vec<WhereNode>,
    orders: Vec<(String, Direction)>,
    group_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    /// Joiner of the most recently added condition; a group opened next
    /// joins with this.
    last_joiner: Joiner,
    open_depth: usize,
    unbalanced_close: bool,
}

impl QueryBuilder {
    /// Starts a builder for the given table. The default operation is a
    /// `SELECT *`.
    pub fn table<T: Into<String>>(table: T) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Select,
            columns: Vec::new(),
            assignments: Vec::new(),
            wheres: Vec::new(),
            orders: Vec::new(),
            group_by: Vec::new(),
            limit: None,
            offset: None,
            last_joiner: Joiner::And,
            open_depth: 0,
            unbalanced_close: false,
        }
    }

    /// Selects the given columns; an empty list means `*`.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operation = Operation::Select;
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn insert<I, S, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<SqlValue>,
    {
        self.operation = Operation::Insert;
        self.assignments = values
            .into_iter()
            .map(|(c, v)| (c.into(), v.into()))
            .collect();
        self
    }

    #[must_use]
    pub fn update<I, S, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<SqlValue>,
    {
        self.operation = Operation::Update;
        self.assignments = values
            .into_iter()
            .map(|(c, v)| (c.into(), v.into()))
            .collect();
        self
    }

    #[must_use]
    pub fn delete(mut self) -> Self {
        self.operation = Operation::Delete;
        self
    }

    /// Adds an `=` condition joined with AND.
    #[must_use]
    pub fn where_<C: Into<String>, V: Into<SqlValue>>(self, column: C, value: V) -> Self {
        self.push_condition(Joiner::And, column.into(), "=".to_string(), value.into())
    }

    /// Adds a condition with an explicit operator, joined with AND.
    #[must_use]
    pub fn where_op<C: Into<String>, O: Into<String>, V: Into<SqlValue>>(
        self,
        column: C,
        op: O,
        value: V,
    ) -> Self {
        self.push_condition(Joiner::And, column.into(), op.into(), value.into())
    }

    /// Adds an `=` condition joined with OR.
    #[must_use]
    pub fn or_where<C: Into<String>, V: Into<SqlValue>>(self, column: C, value: V) -> Self {
        self.push_condition(Joiner::Or, column.into(), "=".to_string(), value.into())
    }

    #[must_use]
    pub fn or_where_op<C: Into<String>, O: Into<String>, V: Into<SqlValue>>(
        self,
        column: C,
        op: O,
        value: V,
    ) -> Self {
        self.push_condition(Joiner::Or, column.into(), op.into(), value.into())
    }

    fn push_condition(mut self, joiner: Joiner, column: String, op: String, value: SqlValue) -> Self {
        self.last_joiner = joiner;
        let node = WhereNode::Cond {
            joiner,
            column,
            op: op.trim().to_string(),
            value,
        };
        self.innermost().push(node);
        self
    }

    /// Opens a parenthesized group. It joins to what precedes it with the
    /// joiner in effect when it was opened (AND initially, OR after an
    /// `or_where`); conditions inside join with AND unless added via
    /// `or_where*`.
    #[must_use]
    pub fn group_start(mut self) -> Self {
        let node = WhereNode::Group {
            joiner: self.last_joiner,
            nodes: Vec::new(),
        };
        self.innermost().push(node);
        self.open_depth += 1;
        self
    }

    #[must_use]
    pub fn group_end(mut self) -> Self {
        if self.open_depth == 0 {
            // Reported at finalize time, like every other validity problem.
            self.unbalanced_close = true;
        } else {
            self.open_depth -= 1;
        }
        self
    }

    /// The innermost open group's node list (the root list when no group is
    /// open). Descending through the last node at each level is sound
    /// because an open group is always the most recently pushed node.
    fn innermost(&mut self) -> &mut Vec<WhereNode> {
        let mut nodes = &mut self.wheres;
        for _ in 0..self.open_depth {
            // Probe without borrowing mutably so the reborrow below never
            // needs a bail-out path of its own.
            if !matches!(nodes.last(), Some(WhereNode::Group { .. })) {
                break;
            }
            let Some(WhereNode::Group { nodes: inner, .. }) = nodes.last_mut() else {
                unreachable!("probed as a group above");
            };
            nodes = inner;
        }
        nodes
    }

    #[must_use]
    pub fn order_by<C: Into<String>>(mut self, column: C, direction: Direction) -> Self {
        self.orders.push((column.into(), direction));
        self
    }

    #[must_use]
    pub fn group_by<C: Into<String>>(mut self, column: C) -> Self {
        self.group_by.push(column.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Renders the SQL with literal values inlined (escaped). Unsafe for
    /// untrusted input; use [`QueryBuilder::to_parameterized`] for anything
    /// user-supplied.
    ///
    /// # Errors
    /// - [`SprigError::InvalidQuery`] for missing insert/update values or
    ///   unbalanced groups. Validation happens here, not at the offending
    ///   call, so chains can be built incrementally.
    pub fn get(&self) -> SprigResult<String> {
        let (sql, _) = self.render(true)?;
        Ok(sql)
    }

    /// Renders the SQL with `?` placeholders plus the bound values in
    /// placeholder order.
    ///
    /// # Errors
    /// - [`SprigError::InvalidQuery`] as for [`QueryBuilder::get`].
    pub fn to_parameterized(&self) -> SprigResult<(String, Vec<SqlValue>)> {
        self.render(false)
    }

    fn validate(&self) -> SprigResult<()> {
        if self.table.is_empty() {
            return Err(invalid("no table name given"));
        }
        if self.unbalanced_close {
            return Err(invalid("group_end() without a matching group_start()"));
        }
        if self.open_depth > 0 {
            return Err(invalid("unclosed condition group"));
        }
        if matches!(self.operation, Operation::Insert | Operation::Update)
            && self.assignments.is_empty()
        {
            return Err(invalid(match self.operation {
                Operation::Insert => "INSERT with no values",
                _ => "UPDATE with no values",
            }));
        }
        Ok(())
    }

    fn render(&self, inline: bool) -> SprigResult<(String, Vec<SqlValue>)> {
        self.validate()?;

        let mut sql = String::new();
        let mut params = Vec::new();

        match self.operation {
            Operation::Select => {
                sql.push_str("SELECT ");
                if self.columns.is_empty() {
                    sql.push('*');
                } else {
                    let cols: Vec<String> =
                        self.columns.iter().map(|c| quote_identifier(c)).collect();
                    sql.push_str(&cols.join(", "));
                }
                sql.push_str(" FROM ");
                sql.push_str(&quote_identifier(&self.table));
            }
            Operation::Insert => {
                let cols: Vec<String> = self
                    .assignments
                    .iter()
                    .map(|(c, _)| quote_identifier(c))
                    .collect();
                let placeholders: Vec<String> = self
                    .assignments
                    .iter()
                    .map(|(_, v)| placeholder(v, inline, &mut params))
                    .collect();
                sql.push_str("INSERT INTO ");
                sql.push_str(&quote_identifier(&self.table));
                sql.push_str(" (");
                sql.push_str(&cols.join(", "));
                sql.push_str(") VALUES (");
                sql.push_str(&placeholders.join(", "));
                sql.push(')');
            }
            Operation::Update => {
                sql.push_str("UPDATE ");
                sql.push_str(&quote_identifier(&self.table));
                sql.push_str(" SET ");
                let sets: Vec<String> = self
                    .assignments
                    .iter()
                    .map(|(c, v)| {
                        format!("{} = {}", quote_identifier(c), placeholder(v, inline, &mut params))
                    })
                    .collect();
                sql.push_str(&sets.join(", "));
            }
            Operation::Delete => {
                sql.push_str("DELETE FROM ");
                sql.push_str(&quote_identifier(&self.table));
            }
        }

        if self.operation != Operation::Insert {
            if !self.wheres.is_empty() {
                sql.push_str(" WHERE ");
                render_where(&self.wheres, inline, &mut sql, &mut params);
            }
            if !self.group_by.is_empty() {
                let cols: Vec<String> =
                    self.group_by.iter().map(|c| quote_identifier(c)).collect();
                sql.push_str(" GROUP BY ");
                sql.push_str(&cols.join(", "));
            }
            if !self.orders.is_empty() {
                let cols: Vec<String> = self
                    .orders
                    .iter()
                    .map(|(c, d)| format!("{} {}", quote_identifier(c), d.as_sql()))
                    .collect();
                sql.push_str(" ORDER BY ");
                sql.push_str(&cols.join(", "));
            }
            if let Some(limit) = self.limit {
                sql.push_str(" LIMIT ");
                sql.push_str(&limit.to_string());
            }
            if let Some(offset) = self.offset {
                sql.push_str(" OFFSET ");
                sql.push_str(&offset.to_string());
            }
        }

        Ok((sql, params))
    }
}

fn invalid(reason: &str) -> SprigError {
    SprigError::InvalidQuery {
        reason: reason.to_string(),
    }
}

fn placeholder(value: &SqlValue, inline: bool, params: &mut Vec<SqlValue>) -> String {
    if inline {
        value.inline()
    } else {
        params.push(value.clone());
        "?".to_string()
    }
}

fn render_where(nodes: &[WhereNode], inline: bool, sql: &mut String, params: &mut Vec<SqlValue>) {
    let mut first = true;
    for node in nodes {
        match node {
            WhereNode::Cond {
                joiner,
                column,
                op,
                value,
            } => {
                if !first {
                    sql.push(' ');
                    sql.push_str(joiner.as_sql());
                    sql.push(' ');
                }
                sql.push_str(&quote_identifier(column));
                sql.push(' ');
                sql.push_str(op);
                sql.push(' ');
                sql.push_str(&placeholder(value, inline, params));
                first = false;
            }
            WhereNode::Group { joiner, nodes } => {
                // An empty group is dropped rather than rendered as `()`.
                if nodes.is_empty() {
                    continue;
                }
                if !first {
                    sql.push(' ');
                    sql.push_str(joiner.as_sql());
                    sql.push(' ');
                }
                sql.push('(');
                render_where(nodes, inline, sql, params);
                sql.push(')');
                first = false;
            }
        }
    }
}

/// Backtick-quotes each dot-separated segment: `a.b` -> `` `a`.`b` ``.
/// `*` passes through; embedded backticks are doubled.
fn quote_identifier(identifier: &str) -> String {
    identifier
        .split('.')
        .map(|segment| {
            if segment == "*" {
                segment.to_string()
            } else {
                format!("`{}`", segment.replace('`', "``"))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_star_with_where() {
        let sql = QueryBuilder::table("users")
            .select::<_, String>([])
            .where_("id", 1)
            .get()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM `users` WHERE `id` = 1");
    }

    #[test]
    fn test_select_parameterized() {
        let (sql, params) = QueryBuilder::table("users")
            .where_("id", 1)
            .to_parameterized()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM `users` WHERE `id` = ?");
        assert_eq!(params, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn test_select_columns_are_quoted() {
        let sql = QueryBuilder::table("posts")
            .select(["id", "author.name"])
            .get()
            .unwrap();
        assert_eq!(sql, "SELECT `id`, `author`.`name` FROM `posts`");
    }

    #[test]
    fn test_clause_order_is_fixed() {
        // limit() before order_by() must still render ORDER BY ... LIMIT ...
        let sql = QueryBuilder::table("logs")
            .limit(10)
            .offset(20)
            .order_by("at", Direction::Desc)
            .group_by("kind")
            .get()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM `logs` GROUP BY `kind` ORDER BY `at` DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_or_where_and_grouping() {
        let sql = QueryBuilder::table("t")
            .where_("a", 1)
            .or_where("b", 2)
            .group_start()
            .where_("c", 3)
            .where_("d", 4)
            .group_end()
            .get()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM `t` WHERE `a` = 1 OR `b` = 2 OR (`c` = 3 AND `d` = 4)"
        );
    }

    #[test]
    fn test_group_after_and_condition_joins_with_and() {
        let sql = QueryBuilder::table("t")
            .where_("a", 1)
            .group_start()
            .where_("b", 2)
            .or_where("c", 3)
            .group_end()
            .get()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM `t` WHERE `a` = 1 AND (`b` = 2 OR `c` = 3)");
    }

    #[test]
    fn test_nested_groups() {
        let sql = QueryBuilder::table("t")
            .group_start()
            .where_("a", 1)
            .group_start()
            .where_("b", 2)
            .or_where("c", 3)
            .group_end()
            .group_end()
            .get()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM `t` WHERE (`a` = 1 AND (`b` = 2 OR `c` = 3))");
    }

    #[test]
    fn test_conditions_land_in_the_innermost_open_group() {
        let sql = QueryBuilder::table("t")
            .where_("a", 1)
            .group_start()
            .where_("b", 2)
            .group_start()
            .where_("c", 3)
            .group_start()
            .or_where("d", 4)
            .group_end()
            .group_end()
            .group_end()
            .get()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM `t` WHERE `a` = 1 AND (`b` = 2 AND (`c` = 3 AND (`d` = 4)))"
        );
    }

    #[test]
    fn test_empty_group_is_dropped() {
        let sql = QueryBuilder::table("t")
            .where_("a", 1)
            .group_start()
            .group_end()
            .get()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM `t` WHERE `a` = 1");
    }

    #[test]
    fn test_where_op() {
        let sql = QueryBuilder::table("t")
            .where_op("age", ">=", 21)
            .get()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM `t` WHERE `age` >= 21");
    }

    #[test]
    fn test_insert_inline_and_parameterized() {
        let builder = QueryBuilder::table("users").insert([
            ("name", SqlValue::from("O'Brien")),
            ("age", SqlValue::from(30)),
        ]);
        assert_eq!(
            builder.get().unwrap(),
            "INSERT INTO `users` (`name`, `age`) VALUES ('O''Brien', 30)"
        );
        let (sql, params) = builder.to_parameterized().unwrap();
        assert_eq!(sql, "INSERT INTO `users` (`name`, `age`) VALUES (?, ?)");
        assert_eq!(
            params,
            vec![SqlValue::from("O'Brien"), SqlValue::Int(30)]
        );
    }

    #[test]
    fn test_update_param_order_is_set_then_where() {
        let (sql, params) = QueryBuilder::table("users")
            .update([("name", SqlValue::from("Ada"))])
            .where_("id", 7)
            .to_parameterized()
            .unwrap();
        assert_eq!(sql, "UPDATE `users` SET `name` = ? WHERE `id` = ?");
        assert_eq!(params, vec![SqlValue::from("Ada"), SqlValue::Int(7)]);
    }

    #[test]
    fn test_delete() {
        let sql = QueryBuilder::table("sessions")
            .delete()
            .where_op("expires_at", "<", 0)
            .get()
            .unwrap();
        assert_eq!(sql, "DELETE FROM `sessions` WHERE `expires_at` < 0");
    }

    #[test]
    fn test_null_and_bool_inline() {
        let sql = QueryBuilder::table("t")
            .insert([("a", SqlValue::Null), ("b", SqlValue::Bool(true))])
            .get()
            .unwrap();
        assert_eq!(sql, "INSERT INTO `t` (`a`, `b`) VALUES (NULL, 1)");
    }

    #[test]
    fn test_insert_with_no_values_fails_at_finalize() {
        let builder = QueryBuilder::table("t").insert::<_, String, SqlValue>([]);
        let err = builder.get().unwrap_err();
        assert!(matches!(err, SprigError::InvalidQuery { .. }));
    }

    #[test]
    fn test_unbalanced_groups_fail_at_finalize() {
        let open = QueryBuilder::table("t").group_start().where_("a", 1);
        assert!(matches!(
            open.get().unwrap_err(),
            SprigError::InvalidQuery { .. }
        ));

        let close = QueryBuilder::table("t").where_("a", 1).group_end();
        assert!(matches!(
            close.get().unwrap_err(),
            SprigError::InvalidQuery { .. }
        ));
    }

    #[test]
    fn test_finalize_is_repeatable() {
        let builder = QueryBuilder::table("t").where_("a", 1);
        let first = builder.get().unwrap();
        let second = builder.get().unwrap();
        assert_eq!(first, second);
        let (sql, params) = builder.to_parameterized().unwrap();
        assert_eq!(sql, "SELECT * FROM `t` WHERE `a` = ?");
        assert_eq!(params, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn test_identifier_quoting_escapes_backticks() {
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(quote_identifier("t.*"), "`t`.*");
    }
}
