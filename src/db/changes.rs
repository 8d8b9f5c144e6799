//! Partial UPDATE builder
//!
//! PUT endpoints only touch the fields present in the request body. `Changes`
//! collects `column = $n` pairs for the provided values and renders a single
//! `UPDATE … WHERE id = $n RETURNING …` statement.

use sqlx::{Encode, Postgres, QueryBuilder, Type};
use uuid::Uuid;

pub struct Changes<'a> {
    builder: QueryBuilder<'a, Postgres>,
    assignments: usize,
    fields: usize,
}

impl<'a> Changes<'a> {
    pub fn new(table: &str) -> Self {
        Self {
            builder: QueryBuilder::new(format!("UPDATE {} SET ", table)),
            assignments: 0,
            fields: 0,
        }
    }

    fn separator(&mut self) {
        if self.assignments > 0 {
            self.builder.push(", ");
        }
        self.assignments += 1;
    }

    /// Add `column = value` when the value was provided
    pub fn set<T>(&mut self, column: &str, value: Option<T>) -> &mut Self
    where
        T: 'a + Encode<'a, Postgres> + Type<Postgres>,
    {
        if let Some(value) = value {
            self.separator();
            self.builder.push(column).push(" = ").push_bind(value);
            self.fields += 1;
        }
        self
    }

    /// Add a raw SQL assignment that does not count as a user-provided field
    pub fn set_raw(&mut self, assignment: &str) -> &mut Self {
        self.separator();
        self.builder.push(assignment);
        self
    }

    /// True when the request carried no updatable field
    pub fn is_empty(&self) -> bool {
        self.fields == 0
    }

    /// Close the statement with `WHERE id = $n RETURNING {returning}`
    pub fn finish(mut self, id: Uuid, returning: &str) -> QueryBuilder<'a, Postgres> {
        self.builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(returning);
        self.builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_missing_values() {
        let mut changes = Changes::new("projects");
        changes
            .set("name", Some("Nordring".to_string()))
            .set::<String>("city", None)
            .set("total_length_m", Some(120.5_f64));
        assert!(!changes.is_empty());

        let builder = changes.finish(Uuid::nil(), "*");
        assert_eq!(
            builder.sql(),
            "UPDATE projects SET name = $1, total_length_m = $2 WHERE id = $3 RETURNING *"
        );
    }

    #[test]
    fn raw_assignments_do_not_count_as_fields() {
        let mut changes = Changes::new("users");
        changes.set_raw("updated_at = NOW()");
        assert!(changes.is_empty());

        changes.set("role", Some("pm"));
        let builder = changes.finish(Uuid::nil(), "id");
        assert_eq!(
            builder.sql(),
            "UPDATE users SET updated_at = NOW(), role = $1 WHERE id = $2 RETURNING id"
        );
    }
}
