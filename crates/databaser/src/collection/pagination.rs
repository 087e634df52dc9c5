//! Page results for collections

use serde_json::{json, Value as JsonValue};

use super::{Collection, CollectionItem};
use crate::databaser::ReturnType;
use crate::error::{ModelError, OrmResult};
use crate::query::QueryBuilder;

/// One page of a collection
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    pub last_page: u64,
    /// 1-based position of the first item on the page; `None` when empty
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub has_more_pages: bool,
    pub prev_page: Option<u64>,
    pub next_page: Option<u64>,
}

impl<T: CollectionItem> Paginated<T> {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "data": self.data.iter().map(CollectionItem::to_json).collect::<Vec<_>>(),
            "current_page": self.current_page,
            "per_page": self.per_page,
            "total": self.total,
            "last_page": self.last_page,
            "from": self.from,
            "to": self.to,
            "has_more_pages": self.has_more_pages,
            "prev_page": self.prev_page,
            "next_page": self.next_page,
        })
    }
}

/// Page metadata around `data`, the items of page `current_page`
pub fn build_pagination_result<T>(data: Vec<T>, total: u64, per_page: u64, current_page: u64) -> Paginated<T> {
    let per_page = per_page.max(1);
    let current_page = current_page.max(1);
    let last_page = total.div_ceil(per_page).max(1);
    let (from, to) = if total == 0 {
        (None, None)
    } else {
        (
            Some((current_page - 1).saturating_mul(per_page).saturating_add(1)),
            Some(current_page.saturating_mul(per_page).min(total)),
        )
    };
    let has_more_pages = current_page < last_page;

    Paginated {
        data,
        current_page,
        per_page,
        total,
        last_page,
        from,
        to,
        has_more_pages,
        prev_page: (current_page > 1).then(|| current_page - 1),
        next_page: has_more_pages.then(|| current_page + 1),
    }
}

impl<T: CollectionItem> Collection<T> {
    /// Page `current_page` (1-based) of `per_page` items.
    ///
    /// An unloaded query-backed collection asks the database (`COUNT(*)`
    /// over the statement, then the statement with `LIMIT/OFFSET`) and stays
    /// unloaded. A loaded collection slices its items in memory.
    pub async fn paginate(&mut self, per_page: u64, current_page: u64) -> OrmResult<Paginated<T>> {
        if per_page == 0 || current_page == 0 {
            return Err(ModelError::Query("per_page and current_page must be at least 1".to_string()));
        }

        if let (false, Some(query), Some(db)) = (self.loaded, self.query.clone(), self.db.clone()) {
            let compiled = query.clone().get_query()?;
            let counted = query.clone().without_pagination().get_query()?;
            let count_sql = format!("SELECT COUNT(*) AS aggregate FROM ({}) aggregate_table", counted.query);
            let count_query = QueryBuilder::new(query.dialect()).raw(&count_sql, counted.bindings);
            let total = db
                .run(count_query, ReturnType::Raw, &[])
                .await?
                .into_rows()
                .into_iter()
                .next()
                .and_then(|row| row.get("aggregate").and_then(|v| v.as_i64()))
                .map_or(0, |n| n.max(0) as u64);

            let table = match &self.table {
                Some(table) => table.clone(),
                None => crate::databaser::guess_table(&compiled.query),
            };
            let rows = db
                .run(query.paginate(per_page, current_page), ReturnType::Raw, &[])
                .await?
                .into_rows();
            let mut data = Vec::with_capacity(rows.len());
            for row in rows {
                let mut item = T::from_row(&db, &table, row);
                item.prepare(&self.with).await?;
                data.push(item);
            }
            return Ok(build_pagination_result(data, total, per_page, current_page));
        }

        self.load().await?;
        let offset = usize::try_from((current_page - 1).saturating_mul(per_page)).unwrap_or(usize::MAX);
        let data = self
            .items
            .iter()
            .skip(offset)
            .take(usize::try_from(per_page).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(build_pagination_result(data, self.items.len() as u64, per_page, current_page))
    }
}
