use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Row};
use uuid::Uuid;

use crate::db::Database;
use crate::error::AppError;
use crate::storage::Storage;
use crate::types::{Budget, ReportFilter, UsageRecord, UsageSummary};

/// SQLite-backed [`Storage`] implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn aggregate_by_field(
        &self,
        field: &str,
        where_clause: &str,
        args: &[Box<dyn ToSql>],
    ) -> Result<std::collections::HashMap<String, f64>, AppError> {
        let mut sql =
            format!("SELECT {field}, COALESCE(SUM(cost_usd), 0) FROM usage_records");
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }
        sql.push_str(&format!(" GROUP BY {field}"));

        let result = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            rows.collect::<Result<std::collections::HashMap<_, _>, _>>()
        })?;
        Ok(result)
    }
}

fn row_to_record(row: &Row<'_>) -> Result<UsageRecord, rusqlite::Error> {
    Ok(UsageRecord {
        id: row.get(0)?,
        provider: row.get(1)?,
        model: row.get(2)?,
        input_tokens: row.get(3)?,
        output_tokens: row.get(4)?,
        cost_usd: row.get(5)?,
        project: row.get(6)?,
        timestamp: row.get::<_, DateTime<Utc>>(7)?,
    })
}

fn row_to_budget(row: &Row<'_>) -> Result<Budget, rusqlite::Error> {
    let period: String = row.get(3)?;
    Ok(Budget {
        id: row.get(0)?,
        name: row.get(1)?,
        limit_usd: row.get(2)?,
        period: period.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?,
        current_spend: row.get(4)?,
        alert_threshold_pct: row.get(5)?,
        created_at: row.get::<_, DateTime<Utc>>(6)?,
        updated_at: row.get::<_, DateTime<Utc>>(7)?,
    })
}

/// Build a WHERE clause and its bound arguments from a [`ReportFilter`].
fn build_where_clause(filter: &ReportFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut conditions: Vec<&str> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref provider) = filter.provider {
        conditions.push("provider = ?");
        args.push(Box::new(provider.clone()));
    }
    if let Some(ref model) = filter.model {
        conditions.push("model = ?");
        args.push(Box::new(model.clone()));
    }
    if let Some(ref project) = filter.project {
        conditions.push("project = ?");
        args.push(Box::new(project.clone()));
    }
    if let Some(start) = filter.start {
        conditions.push("timestamp >= ?");
        args.push(Box::new(start));
    }
    if let Some(end) = filter.end {
        conditions.push("timestamp < ?");
        args.push(Box::new(end));
    }

    (conditions.join(" AND "), args)
}

impl Storage for SqliteStorage {
    fn record_usage(&self, record: &mut UsageRecord) -> Result<(), AppError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO usage_records \
                 (id, provider, model, input_tokens, output_tokens, cost_usd, project, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.provider,
                    record.model,
                    record.input_tokens,
                    record.output_tokens,
                    record.cost_usd,
                    record.project,
                    record.timestamp,
                ],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    fn query_usage(&self, filter: &ReportFilter) -> Result<Vec<UsageRecord>, AppError> {
        let (where_clause, args) = build_where_clause(filter);
        let mut sql = String::from(
            "SELECT id, provider, model, input_tokens, output_tokens, cost_usd, project, timestamp \
             FROM usage_records",
        );
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        sql.push_str(" ORDER BY timestamp DESC");

        let records = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), row_to_record)?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(records)
    }

    fn aggregate_usage(&self, filter: &ReportFilter) -> Result<UsageSummary, AppError> {
        let (where_clause, args) = build_where_clause(filter);
        let mut sql = String::from(
            "SELECT COALESCE(SUM(cost_usd), 0), COALESCE(SUM(input_tokens), 0), \
             COALESCE(SUM(output_tokens), 0), COUNT(*) FROM usage_records",
        );
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }

        let mut summary = self.db.with_conn(|conn| {
            conn.query_row(&sql, params_from_iter(args.iter()), |row| {
                Ok(UsageSummary {
                    total_cost_usd: row.get(0)?,
                    total_input_tokens: row.get(1)?,
                    total_output_tokens: row.get(2)?,
                    record_count: row.get(3)?,
                    ..Default::default()
                })
            })
        })?;

        summary.by_provider = self.aggregate_by_field("provider", &where_clause, &args)?;
        summary.by_model = self.aggregate_by_field("model", &where_clause, &args)?;
        Ok(summary)
    }

    fn set_budget(&self, budget: &mut Budget) -> Result<(), AppError> {
        if budget.id.is_empty() {
            budget.id = Uuid::new_v4().to_string();
        }
        budget.updated_at = Utc::now();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO budgets \
                 (id, name, limit_usd, period, current_spend, alert_threshold_pct, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(name) DO UPDATE SET \
                   limit_usd = excluded.limit_usd, \
                   period = excluded.period, \
                   alert_threshold_pct = excluded.alert_threshold_pct, \
                   updated_at = excluded.updated_at",
                params![
                    budget.id,
                    budget.name,
                    budget.limit_usd,
                    budget.period.to_string(),
                    budget.current_spend,
                    budget.alert_threshold_pct,
                    budget.created_at,
                    budget.updated_at,
                ],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    fn get_budget(&self, name: &str) -> Result<Budget, AppError> {
        let result = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, limit_usd, period, current_spend, alert_threshold_pct, \
                 created_at, updated_at FROM budgets WHERE name = ?1",
            )?;
            match stmt.query_row(params![name], row_to_budget) {
                Ok(b) => Ok(Some(b)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })?;

        result.ok_or_else(|| AppError::NotFound(format!("budget {name:?} not found")))
    }

    fn list_budgets(&self) -> Result<Vec<Budget>, AppError> {
        let budgets = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, limit_usd, period, current_spend, alert_threshold_pct, \
                 created_at, updated_at FROM budgets ORDER BY name",
            )?;
            let rows = stmt.query_map([], row_to_budget)?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(budgets)
    }

    fn update_budget_spend(&self, name: &str, delta: f64) -> Result<(), AppError> {
        let affected = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE budgets SET current_spend = current_spend + ?1, updated_at = ?2 \
                 WHERE name = ?3",
                params![delta, Utc::now(), name],
            )
        })?;

        if affected == 0 {
            return Err(AppError::NotFound(format!("budget {name:?} not found")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BudgetPeriod;
    use chrono::Duration;

    fn test_storage() -> SqliteStorage {
        SqliteStorage::new(Database::open_in_memory().unwrap())
    }

    fn make_record(provider: &str, model: &str, project: &str, cost: f64) -> UsageRecord {
        UsageRecord {
            id: String::new(),
            provider: provider.to_string(),
            model: model.to_string(),
            input_tokens: 1000,
            output_tokens: 500,
            cost_usd: cost,
            project: project.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn make_budget(name: &str, limit: f64) -> Budget {
        Budget {
            id: String::new(),
            name: name.to_string(),
            limit_usd: limit,
            period: BudgetPeriod::Monthly,
            current_spend: 0.0,
            alert_threshold_pct: 80.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_assigns_id() {
        let storage = test_storage();
        let mut record = make_record("openai", "gpt-4o", "default", 0.01);
        storage.record_usage(&mut record).unwrap();
        assert!(!record.id.is_empty());
    }

    #[test]
    fn test_record_rejects_duplicate_id() {
        let storage = test_storage();
        let mut record = make_record("openai", "gpt-4o", "default", 0.01);
        storage.record_usage(&mut record).unwrap();
        let mut dup = record.clone();
        assert!(storage.record_usage(&mut dup).is_err());
    }

    #[test]
    fn test_query_round_trip() {
        let storage = test_storage();
        let mut record = make_record("openai", "gpt-4o", "research", 0.25);
        storage.record_usage(&mut record).unwrap();

        let filter = ReportFilter {
            provider: Some("openai".to_string()),
            project: Some("research".to_string()),
            ..Default::default()
        };
        let results = storage.query_usage(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, record.id);
        assert_eq!(results[0].model, "gpt-4o");
        assert_eq!(results[0].input_tokens, 1000);
        assert!((results[0].cost_usd - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_query_newest_first() {
        let storage = test_storage();
        let now = Utc::now();
        for (i, offset) in [2i64, 0, 1].iter().enumerate() {
            let mut r = make_record("openai", "gpt-4o", "default", i as f64);
            r.timestamp = now - Duration::hours(*offset);
            storage.record_usage(&mut r).unwrap();
        }

        let results = storage.query_usage(&ReportFilter::default()).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].timestamp >= results[1].timestamp);
        assert!(results[1].timestamp >= results[2].timestamp);
    }

    #[test]
    fn test_query_time_range_half_open() {
        let storage = test_storage();
        let base = Utc::now();
        for offset in [0i64, 1, 2] {
            let mut r = make_record("openai", "gpt-4o", "default", 1.0);
            r.timestamp = base + Duration::hours(offset);
            storage.record_usage(&mut r).unwrap();
        }

        let filter = ReportFilter {
            start: Some(base),
            end: Some(base + Duration::hours(2)),
            ..Default::default()
        };
        // [base, base+2h) excludes the record at exactly base+2h.
        let results = storage.query_usage(&filter).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_aggregate_matches_query_sum() {
        let storage = test_storage();
        for (provider, model, cost) in [
            ("openai", "gpt-4o", 0.5),
            ("openai", "gpt-4o-mini", 0.1),
            ("anthropic", "claude-3-5-sonnet-20241022", 0.4),
        ] {
            let mut r = make_record(provider, model, "default", cost);
            storage.record_usage(&mut r).unwrap();
        }

        let filter = ReportFilter::default();
        let summary = storage.aggregate_usage(&filter).unwrap();
        let records = storage.query_usage(&filter).unwrap();
        let sum: f64 = records.iter().map(|r| r.cost_usd).sum();

        assert_eq!(summary.record_count, 3);
        assert!((summary.total_cost_usd - sum).abs() < 1e-9);
        assert_eq!(summary.total_input_tokens, 3000);
        assert_eq!(summary.total_output_tokens, 1500);
        assert!((summary.by_provider["openai"] - 0.6).abs() < 1e-9);
        assert!((summary.by_provider["anthropic"] - 0.4).abs() < 1e-9);
        assert!((summary.by_model["gpt-4o"] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_empty() {
        let storage = test_storage();
        let summary = storage.aggregate_usage(&ReportFilter::default()).unwrap();
        assert_eq!(summary.record_count, 0);
        assert_eq!(summary.total_cost_usd, 0.0);
        assert!(summary.by_provider.is_empty());
    }

    #[test]
    fn test_set_and_get_budget() {
        let storage = test_storage();
        let mut budget = make_budget("team", 100.0);
        storage.set_budget(&mut budget).unwrap();
        assert!(!budget.id.is_empty());

        let fetched = storage.get_budget("team").unwrap();
        assert_eq!(fetched.name, "team");
        assert_eq!(fetched.limit_usd, 100.0);
        assert_eq!(fetched.period, BudgetPeriod::Monthly);
    }

    #[test]
    fn test_set_budget_upsert_preserves_spend() {
        let storage = test_storage();
        let mut budget = make_budget("team", 100.0);
        storage.set_budget(&mut budget).unwrap();
        storage.update_budget_spend("team", 42.0).unwrap();

        let mut updated = make_budget("team", 200.0);
        storage.set_budget(&mut updated).unwrap();

        let fetched = storage.get_budget("team").unwrap();
        assert_eq!(fetched.limit_usd, 200.0);
        assert!((fetched.current_spend - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_get_budget_not_found() {
        let storage = test_storage();
        assert!(matches!(
            storage.get_budget("ghost"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_budgets_name_order() {
        let storage = test_storage();
        for name in ["zeta", "alpha", "mid"] {
            let mut b = make_budget(name, 10.0);
            storage.set_budget(&mut b).unwrap();
        }
        let names: Vec<_> = storage
            .list_budgets()
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_update_budget_spend_accumulates() {
        let storage = test_storage();
        let mut budget = make_budget("team", 100.0);
        storage.set_budget(&mut budget).unwrap();

        storage.update_budget_spend("team", 5.0).unwrap();
        storage.update_budget_spend("team", 3.0).unwrap();
        storage.update_budget_spend("team", -2.0).unwrap();

        let fetched = storage.get_budget("team").unwrap();
        assert!((fetched.current_spend - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_update_budget_spend_unknown_name() {
        let storage = test_storage();
        assert!(matches!(
            storage.update_budget_spend("ghost", 1.0),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_spend_no_lost_updates() {
        let storage = std::sync::Arc::new(SqliteStorage::new(
            Database::open_in_memory().unwrap(),
        ));
        let mut budget = make_budget("load", 0.0);
        storage.set_budget(&mut budget).unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let storage = storage.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    storage.update_budget_spend("load", 0.25).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let fetched = storage.get_budget("load").unwrap();
        assert!((fetched.current_spend - 100.0).abs() < 1e-6);
    }
}
