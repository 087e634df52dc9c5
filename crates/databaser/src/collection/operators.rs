//! In-memory collection operators
//!
//! Every operator loads the collection first. Transformations return a new
//! collection sharing the `Databaser` handle; `sort_by`, `sort_by_desc`,
//! `sort`, `reverse`, `push` and `unique` work in place.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use super::{compare_values, Collection, CollectionItem};
use crate::error::{ModelError, OrmResult};
use crate::value::Value;

fn matches_operator(left: &Value, operator: &str, right: &Value) -> OrmResult<bool> {
    let ordering = || compare_values(left, right);
    Ok(match operator {
        "=" | "==" => left.loose_eq(right),
        "!=" | "<>" => !left.loose_eq(right),
        "===" => left == right,
        "!==" => left != right,
        "<" => ordering() == Ordering::Less,
        "<=" => ordering() != Ordering::Greater,
        ">" => ordering() == Ordering::Greater,
        ">=" => ordering() != Ordering::Less,
        other => return Err(ModelError::Query(format!("unknown comparison operator '{}'", other))),
    })
}

/// Identity used by unique/diff/intersect
fn identity<T: CollectionItem>(item: &T) -> String {
    item.to_json().to_string()
}

fn numbers<'a, T: CollectionItem>(items: &'a [T], field: &'a str) -> impl Iterator<Item = f64> + 'a {
    items.iter().filter_map(move |item| item.field(field).and_then(|v| v.as_f64()))
}

impl<T: CollectionItem> Collection<T> {
    pub async fn all(&mut self) -> OrmResult<&[T]> {
        self.load().await?;
        Ok(&self.items)
    }

    pub async fn first(&mut self) -> OrmResult<Option<&T>> {
        self.load().await?;
        Ok(self.items.first())
    }

    pub async fn last(&mut self) -> OrmResult<Option<&T>> {
        self.load().await?;
        Ok(self.items.last())
    }

    /// Item at `index`
    pub async fn get(&mut self, index: usize) -> OrmResult<Option<&T>> {
        self.load().await?;
        Ok(self.items.get(index))
    }

    pub async fn count(&mut self) -> OrmResult<usize> {
        self.load().await?;
        Ok(self.items.len())
    }

    pub async fn is_empty(&mut self) -> OrmResult<bool> {
        Ok(self.count().await? == 0)
    }

    pub async fn is_not_empty(&mut self) -> OrmResult<bool> {
        Ok(self.count().await? > 0)
    }

    /// Visit items in order until `f` returns `false`
    pub async fn each<F>(&mut self, mut f: F) -> OrmResult<&mut Self>
    where
        F: FnMut(&T) -> bool,
    {
        self.load().await?;
        for item in &self.items {
            if !f(item) {
                break;
            }
        }
        Ok(self)
    }

    pub async fn map<U, F>(&mut self, f: F) -> OrmResult<Collection<U>>
    where
        U: CollectionItem,
        F: FnMut(&T) -> U,
    {
        self.load().await?;
        Ok(self.derive(self.items.iter().map(f).collect()))
    }

    pub async fn flat_map<U, F>(&mut self, mut f: F) -> OrmResult<Collection<U>>
    where
        U: CollectionItem,
        F: FnMut(&T) -> Vec<U>,
    {
        self.load().await?;
        Ok(self.derive(self.items.iter().flat_map(|item| f(item)).collect()))
    }

    pub async fn filter<F>(&mut self, mut f: F) -> OrmResult<Collection<T>>
    where
        F: FnMut(&T) -> bool,
    {
        self.load().await?;
        Ok(self.derive(self.items.iter().filter(|item| f(*item)).cloned().collect()))
    }

    pub async fn reject<F>(&mut self, mut f: F) -> OrmResult<Collection<T>>
    where
        F: FnMut(&T) -> bool,
    {
        self.filter(|item| !f(item)).await
    }

    pub async fn reduce<A, F>(&mut self, init: A, f: F) -> OrmResult<A>
    where
        F: FnMut(A, &T) -> A,
    {
        self.load().await?;
        Ok(self.items.iter().fold(init, f))
    }

    /// Items whose `field` compares to `value` with `operator`
    /// (`=`, `==`, `===`, `!=`, `<>`, `!==`, `<`, `<=`, `>`, `>=`)
    pub async fn where_field(&mut self, field: &str, operator: &str, value: impl Into<Value>) -> OrmResult<Collection<T>> {
        self.load().await?;
        let value = value.into();
        let mut kept = Vec::new();
        for item in &self.items {
            let current = item.field(field).unwrap_or_default();
            if matches_operator(&current, operator, &value)? {
                kept.push(item.clone());
            }
        }
        Ok(self.derive(kept))
    }

    pub async fn where_in_field(&mut self, field: &str, values: &[Value]) -> OrmResult<Collection<T>> {
        self.filter(|item| {
            let current = item.field(field).unwrap_or_default();
            values.iter().any(|v| current.loose_eq(v))
        })
        .await
    }

    pub async fn first_where(&mut self, field: &str, operator: &str, value: impl Into<Value>) -> OrmResult<Option<T>> {
        Ok(self.where_field(field, operator, value).await?.into_items().into_iter().next())
    }

    pub async fn contains<F>(&mut self, f: F) -> OrmResult<bool>
    where
        F: FnMut(&T) -> bool,
    {
        self.load().await?;
        Ok(self.items.iter().any(f))
    }

    pub async fn every<F>(&mut self, f: F) -> OrmResult<bool>
    where
        F: FnMut(&T) -> bool,
    {
        self.load().await?;
        Ok(self.items.iter().all(f))
    }

    pub async fn some<F>(&mut self, f: F) -> OrmResult<bool>
    where
        F: FnMut(&T) -> bool,
    {
        self.contains(f).await
    }

    /// Values of `field`; missing fields yield null
    pub async fn pluck(&mut self, field: &str) -> OrmResult<Collection<Value>> {
        self.load().await?;
        let values = self.items.iter().map(|item| item.field(field).unwrap_or_default()).collect();
        Ok(self.derive(values))
    }

    /// Items keyed by the string form of `field`; later items win
    pub async fn key_by(&mut self, field: &str) -> OrmResult<BTreeMap<String, T>> {
        self.load().await?;
        Ok(self
            .items
            .iter()
            .map(|item| (item.field(field).unwrap_or_default().to_string(), item.clone()))
            .collect())
    }

    pub async fn group_by(&mut self, field: &str) -> OrmResult<BTreeMap<String, Collection<T>>> {
        self.load().await?;
        let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
        for item in &self.items {
            let key = item.field(field).unwrap_or_default().to_string();
            groups.entry(key).or_default().push(item.clone());
        }
        Ok(groups.into_iter().map(|(key, items)| (key, self.derive(items))).collect())
    }

    pub async fn sort_by(&mut self, field: &str) -> OrmResult<&mut Self> {
        self.load().await?;
        self.items
            .sort_by(|a, b| compare_values(&a.field(field).unwrap_or_default(), &b.field(field).unwrap_or_default()));
        Ok(self)
    }

    pub async fn sort_by_desc(&mut self, field: &str) -> OrmResult<&mut Self> {
        self.load().await?;
        self.items
            .sort_by(|a, b| compare_values(&b.field(field).unwrap_or_default(), &a.field(field).unwrap_or_default()));
        Ok(self)
    }

    pub async fn sort<F>(&mut self, compare: F) -> OrmResult<&mut Self>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.load().await?;
        self.items.sort_by(compare);
        Ok(self)
    }

    pub async fn reverse(&mut self) -> OrmResult<&mut Self> {
        self.load().await?;
        self.items.reverse();
        Ok(self)
    }

    pub async fn push(&mut self, item: T) -> OrmResult<&mut Self> {
        self.load().await?;
        self.items.push(item);
        Ok(self)
    }

    /// Drop repeated items, by `field` when given, else by whole content.
    /// The first occurrence is kept.
    pub async fn unique(&mut self, field: Option<&str>) -> OrmResult<&mut Self> {
        self.load().await?;
        let mut seen = HashSet::new();
        self.items.retain(|item| {
            let key = match field {
                Some(field) => item.field(field).unwrap_or_default().to_string(),
                None => identity(item),
            };
            seen.insert(key)
        });
        Ok(self)
    }

    pub async fn take(&mut self, count: usize) -> OrmResult<Collection<T>> {
        self.slice(0, Some(count)).await
    }

    pub async fn skip(&mut self, count: usize) -> OrmResult<Collection<T>> {
        self.slice(count, None).await
    }

    /// `length` items starting at `offset` (to the end when `None`)
    pub async fn slice(&mut self, offset: usize, length: Option<usize>) -> OrmResult<Collection<T>> {
        self.load().await?;
        let items = self
            .items
            .iter()
            .skip(offset)
            .take(length.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(self.derive(items))
    }

    pub async fn chunk(&mut self, size: usize) -> OrmResult<Vec<Collection<T>>> {
        if size == 0 {
            return Err(ModelError::Query("chunk size must be at least 1".to_string()));
        }
        self.load().await?;
        Ok(self.items.chunks(size).map(|chunk| self.derive(chunk.to_vec())).collect())
    }

    /// Items passing `f`, then the rest
    pub async fn partition<F>(&mut self, f: F) -> OrmResult<(Collection<T>, Collection<T>)>
    where
        F: FnMut(&T) -> bool,
    {
        self.load().await?;
        let (pass, fail): (Vec<T>, Vec<T>) = self.items.iter().cloned().partition(f);
        Ok((self.derive(pass), self.derive(fail)))
    }

    /// Every `step`-th item starting at `offset`
    pub async fn nth(&mut self, step: usize, offset: usize) -> OrmResult<Collection<T>> {
        if step == 0 {
            return Err(ModelError::Query("nth step must be at least 1".to_string()));
        }
        self.load().await?;
        Ok(self.derive(self.items.iter().skip(offset).step_by(step).cloned().collect()))
    }

    /// Items not present in `other`
    pub async fn diff(&mut self, other: &[T]) -> OrmResult<Collection<T>> {
        let other: HashSet<String> = other.iter().map(identity).collect();
        self.filter(|item| !other.contains(&identity(item))).await
    }

    /// Items also present in `other`
    pub async fn intersect(&mut self, other: &[T]) -> OrmResult<Collection<T>> {
        let other: HashSet<String> = other.iter().map(identity).collect();
        self.filter(|item| other.contains(&identity(item))).await
    }

    pub async fn merge(&mut self, other: Vec<T>) -> OrmResult<Collection<T>> {
        self.load().await?;
        let mut items = self.items.clone();
        items.extend(other);
        Ok(self.derive(items))
    }

    /// Pairs of items; stops at the shorter side
    pub async fn zip<U>(&mut self, other: Vec<U>) -> OrmResult<Vec<(T, U)>> {
        self.load().await?;
        Ok(self.items.iter().cloned().zip(other).collect())
    }

    pub async fn implode(&mut self, field: &str, glue: &str) -> OrmResult<String> {
        self.load().await?;
        Ok(self
            .items
            .iter()
            .map(|item| item.field(field).unwrap_or_default().to_string())
            .collect::<Vec<_>>()
            .join(glue))
    }

    /// Sum of the numeric values of `field`; non-numeric values are skipped
    pub async fn sum(&mut self, field: &str) -> OrmResult<f64> {
        self.load().await?;
        Ok(numbers(&self.items, field).sum())
    }

    /// Mean of the numeric values of `field`, 0 when there are none
    pub async fn avg(&mut self, field: &str) -> OrmResult<f64> {
        self.load().await?;
        let (sum, count) = numbers(&self.items, field).fold((0.0, 0usize), |(s, c), n| (s + n, c + 1));
        Ok(if count == 0 { 0.0 } else { sum / count as f64 })
    }

    pub async fn min(&mut self, field: &str) -> OrmResult<Option<f64>> {
        self.load().await?;
        Ok(numbers(&self.items, field).fold(None, |min: Option<f64>, n| Some(min.map_or(n, |m| m.min(n)))))
    }

    pub async fn max(&mut self, field: &str) -> OrmResult<Option<f64>> {
        self.load().await?;
        Ok(numbers(&self.items, field).fold(None, |max: Option<f64>, n| Some(max.map_or(n, |m| m.max(n)))))
    }
}
