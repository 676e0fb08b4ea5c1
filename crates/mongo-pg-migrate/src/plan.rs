//! Static phase plan: the fixed, closed set of tables the engine migrates.
//!
//! Tables are grouped into ordered phases such that a table's foreign keys
//! only reference tables in the same or an earlier phase (same-phase only
//! for the `accounts` self-reference). The terminal phase holds pure link
//! tables, populated by the junction linker after every entity table is
//! complete. This is configuration, not runtime state: the orchestrator
//! uses it for sequencing, the transformers for field coercion rules, and
//! the validator for knowing which foreign keys and types to audit.

use std::collections::HashMap;

/// Declared type of a target field, used for transform coercion and for
/// validator layer 4 (type conformance).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UUID primary key or rewritten foreign key. Nullable for FKs.
    Uuid,
    /// Free text.
    Text,
    /// Canonical UTC timestamp; invalid/missing source values become null.
    Timestamp,
    /// Enumerated value with an allow-list; mismatches substitute the
    /// documented default (with a logged warning).
    Enum {
        allowed: &'static [&'static str],
        default: &'static str,
    },
    /// Numeric value.
    Number,
    /// Boolean flag.
    Boolean,
    /// Opaque structured payload (tags, line items, settings) passed
    /// through without inspection.
    Payload,
}

/// One target field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// A declared foreign key: `field` holds a rewritten id referencing a row
/// of table `references`.
#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub field: &'static str,
    pub references: &'static str,
}

/// One target table and how it is fed from the source store.
#[derive(Debug, Clone)]
pub struct TableSpec {
    /// Target table name (snake_case).
    pub name: &'static str,
    /// Source collection name (camelCase). Empty for link tables, which
    /// have no collection of their own.
    pub collection: &'static str,
    /// Typed field list, `id` first.
    pub fields: Vec<FieldSpec>,
    /// Declared foreign keys (excluding `id`).
    pub foreign_keys: Vec<ForeignKey>,
    /// Pure link table: exactly two foreign keys, no own identity beyond
    /// the pair.
    pub is_link: bool,
}

/// An ordered group of tables with no forward dependencies.
#[derive(Debug, Clone)]
pub struct Phase {
    /// 1-based phase number.
    pub number: usize,
    pub tables: Vec<TableSpec>,
}

/// The full migration plan.
#[derive(Debug)]
pub struct PhasePlan {
    phases: Vec<Phase>,
    // table name -> (phase index, table index) for O(1) lookups.
    index: HashMap<&'static str, (usize, usize)>,
}

fn f(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

fn fk(field: &'static str, references: &'static str) -> ForeignKey {
    ForeignKey { field, references }
}

fn entity(
    name: &'static str,
    collection: &'static str,
    fields: Vec<FieldSpec>,
    foreign_keys: Vec<ForeignKey>,
) -> TableSpec {
    TableSpec {
        name,
        collection,
        fields,
        foreign_keys,
        is_link: false,
    }
}

fn link(name: &'static str, left: ForeignKey, right: ForeignKey) -> TableSpec {
    TableSpec {
        name,
        collection: "",
        fields: vec![f(left.field, FieldKind::Uuid), f(right.field, FieldKind::Uuid)],
        foreign_keys: vec![left, right],
        is_link: true,
    }
}

use FieldKind::{Boolean, Number, Payload, Text, Timestamp, Uuid};

pub(crate) const TENANT_PLAN: FieldKind = FieldKind::Enum {
    allowed: &["free", "starter", "growth", "enterprise"],
    default: "free",
};
pub(crate) const TENANT_STATUS: FieldKind = FieldKind::Enum {
    allowed: &["active", "suspended", "churned"],
    default: "active",
};
pub(crate) const USER_STATUS: FieldKind = FieldKind::Enum {
    allowed: &["invited", "active", "deactivated"],
    default: "active",
};
pub(crate) const INDUSTRY: FieldKind = FieldKind::Enum {
    allowed: &[
        "technology",
        "finance",
        "healthcare",
        "manufacturing",
        "retail",
        "other",
    ],
    default: "other",
};
pub(crate) const VISIBILITY: FieldKind = FieldKind::Enum {
    allowed: &["private", "team", "tenant"],
    default: "private",
};
pub(crate) const CHANNEL: FieldKind = FieldKind::Enum {
    allowed: &["email", "social", "event", "web"],
    default: "email",
};
pub(crate) const OPPORTUNITY_STATUS: FieldKind = FieldKind::Enum {
    allowed: &["open", "won", "lost"],
    default: "open",
};
pub(crate) const INVOICE_STATUS: FieldKind = FieldKind::Enum {
    allowed: &["draft", "sent", "paid", "void"],
    default: "draft",
};
pub(crate) const TASK_STATUS: FieldKind = FieldKind::Enum {
    allowed: &["todo", "in_progress", "done", "archived"],
    default: "todo",
};
pub(crate) const PRIORITY: FieldKind = FieldKind::Enum {
    allowed: &["low", "medium", "high", "urgent"],
    default: "medium",
};
pub(crate) const ACTIVITY_KIND: FieldKind = FieldKind::Enum {
    allowed: &["call", "email", "meeting", "note"],
    default: "note",
};
pub(crate) const PAYMENT_METHOD: FieldKind = FieldKind::Enum {
    allowed: &["card", "bank_transfer", "check", "cash"],
    default: "bank_transfer",
};

impl PhasePlan {
    /// The standard plan for the CRM dataset: five entity phases and a
    /// terminal link phase, 28 tables in total.
    pub fn standard() -> Self {
        let phases = vec![
            Phase {
                number: 1,
                tables: vec![
                    entity(
                        "tenants",
                        "tenants",
                        vec![
                            f("id", Uuid),
                            f("name", Text),
                            f("plan", TENANT_PLAN),
                            f("status", TENANT_STATUS),
                            f("settings", Payload),
                            f("created_at", Timestamp),
                            f("updated_at", Timestamp),
                        ],
                        vec![],
                    ),
                    entity(
                        "currencies",
                        "currencies",
                        vec![
                            f("id", Uuid),
                            f("code", Text),
                            f("name", Text),
                            f("symbol", Text),
                            f("decimal_places", Number),
                            f("created_at", Timestamp),
                        ],
                        vec![],
                    ),
                    entity(
                        "roles",
                        "roles",
                        vec![
                            f("id", Uuid),
                            f("name", Text),
                            f("permissions", Payload),
                            f("is_system", Boolean),
                            f("created_at", Timestamp),
                        ],
                        vec![],
                    ),
                    entity(
                        "product_categories",
                        "productCategories",
                        vec![
                            f("id", Uuid),
                            f("name", Text),
                            f("description", Text),
                            f("created_at", Timestamp),
                        ],
                        vec![],
                    ),
                ],
            },
            Phase {
                number: 2,
                tables: vec![
                    entity(
                        "users",
                        "users",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("role_id", Uuid),
                            f("email", Text),
                            f("full_name", Text),
                            f("status", USER_STATUS),
                            f("last_login_at", Timestamp),
                            f("created_at", Timestamp),
                            f("updated_at", Timestamp),
                        ],
                        vec![fk("tenant_id", "tenants"), fk("role_id", "roles")],
                    ),
                    entity(
                        "teams",
                        "teams",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("name", Text),
                            f("description", Text),
                            f("created_at", Timestamp),
                        ],
                        vec![fk("tenant_id", "tenants")],
                    ),
                    entity(
                        "pipelines",
                        "pipelines",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("name", Text),
                            f("is_default", Boolean),
                            f("created_at", Timestamp),
                        ],
                        vec![fk("tenant_id", "tenants")],
                    ),
                    entity(
                        "products",
                        "products",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("category_id", Uuid),
                            f("currency_id", Uuid),
                            f("sku", Text),
                            f("name", Text),
                            f("unit_price", Number),
                            f("active", Boolean),
                            f("attributes", Payload),
                            f("created_at", Timestamp),
                            f("updated_at", Timestamp),
                        ],
                        vec![
                            fk("tenant_id", "tenants"),
                            fk("category_id", "product_categories"),
                            fk("currency_id", "currencies"),
                        ],
                    ),
                    entity(
                        "email_templates",
                        "emailTemplates",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("name", Text),
                            f("subject", Text),
                            f("body", Text),
                            f("created_at", Timestamp),
                            f("updated_at", Timestamp),
                        ],
                        vec![fk("tenant_id", "tenants")],
                    ),
                ],
            },
            Phase {
                number: 3,
                tables: vec![
                    entity(
                        "accounts",
                        "accounts",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("owner_id", Uuid),
                            f("currency_id", Uuid),
                            f("parent_account_id", Uuid),
                            f("name", Text),
                            f("industry", INDUSTRY),
                            f("annual_revenue", Number),
                            f("website", Text),
                            f("tags", Payload),
                            f("created_at", Timestamp),
                            f("updated_at", Timestamp),
                        ],
                        vec![
                            fk("tenant_id", "tenants"),
                            fk("owner_id", "users"),
                            fk("currency_id", "currencies"),
                            // Self-reference: the only same-phase dependency.
                            fk("parent_account_id", "accounts"),
                        ],
                    ),
                    entity(
                        "boards",
                        "boards",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("owner_id", Uuid),
                            f("name", Text),
                            f("visibility", VISIBILITY),
                            f("created_at", Timestamp),
                            f("updated_at", Timestamp),
                        ],
                        vec![fk("tenant_id", "tenants"), fk("owner_id", "users")],
                    ),
                    entity(
                        "campaigns",
                        "campaigns",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("owner_id", Uuid),
                            f("email_template_id", Uuid),
                            f("name", Text),
                            f("channel", CHANNEL),
                            f("budget", Number),
                            f("starts_at", Timestamp),
                            f("ends_at", Timestamp),
                            f("created_at", Timestamp),
                        ],
                        vec![
                            fk("tenant_id", "tenants"),
                            fk("owner_id", "users"),
                            fk("email_template_id", "email_templates"),
                        ],
                    ),
                    entity(
                        "pipeline_stages",
                        "pipelineStages",
                        vec![
                            f("id", Uuid),
                            f("pipeline_id", Uuid),
                            f("name", Text),
                            f("position", Number),
                            f("probability", Number),
                            f("created_at", Timestamp),
                        ],
                        vec![fk("pipeline_id", "pipelines")],
                    ),
                ],
            },
            Phase {
                number: 4,
                tables: vec![
                    entity(
                        "contacts",
                        "contacts",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("account_id", Uuid),
                            f("owner_id", Uuid),
                            f("first_name", Text),
                            f("last_name", Text),
                            f("email", Text),
                            f("phone", Text),
                            f("title", Text),
                            f("tags", Payload),
                            f("created_at", Timestamp),
                            f("updated_at", Timestamp),
                        ],
                        vec![
                            fk("tenant_id", "tenants"),
                            fk("account_id", "accounts"),
                            fk("owner_id", "users"),
                        ],
                    ),
                    entity(
                        "opportunities",
                        "opportunities",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("account_id", Uuid),
                            f("stage_id", Uuid),
                            f("owner_id", Uuid),
                            f("campaign_id", Uuid),
                            f("currency_id", Uuid),
                            f("name", Text),
                            f("amount", Number),
                            f("status", OPPORTUNITY_STATUS),
                            f("expected_close_at", Timestamp),
                            f("created_at", Timestamp),
                            f("updated_at", Timestamp),
                        ],
                        vec![
                            fk("tenant_id", "tenants"),
                            fk("account_id", "accounts"),
                            fk("stage_id", "pipeline_stages"),
                            fk("owner_id", "users"),
                            fk("campaign_id", "campaigns"),
                            fk("currency_id", "currencies"),
                        ],
                    ),
                    entity(
                        "invoices",
                        "invoices",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("account_id", Uuid),
                            f("currency_id", Uuid),
                            f("number", Text),
                            f("status", INVOICE_STATUS),
                            f("issued_at", Timestamp),
                            f("due_at", Timestamp),
                            f("total", Number),
                            f("line_items", Payload),
                            f("created_at", Timestamp),
                            f("updated_at", Timestamp),
                        ],
                        vec![
                            fk("tenant_id", "tenants"),
                            fk("account_id", "accounts"),
                            fk("currency_id", "currencies"),
                        ],
                    ),
                    entity(
                        "tasks",
                        "tasks",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("board_id", Uuid),
                            f("assignee_id", Uuid),
                            f("account_id", Uuid),
                            f("title", Text),
                            f("status", TASK_STATUS),
                            f("priority", PRIORITY),
                            f("due_at", Timestamp),
                            f("created_at", Timestamp),
                            f("updated_at", Timestamp),
                        ],
                        vec![
                            fk("tenant_id", "tenants"),
                            fk("board_id", "boards"),
                            fk("assignee_id", "users"),
                            fk("account_id", "accounts"),
                        ],
                    ),
                ],
            },
            Phase {
                number: 5,
                tables: vec![
                    entity(
                        "documents",
                        "documents",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("account_id", Uuid),
                            f("uploaded_by", Uuid),
                            f("file_name", Text),
                            f("mime_type", Text),
                            f("size_bytes", Number),
                            f("storage_key", Text),
                            f("created_at", Timestamp),
                        ],
                        vec![
                            fk("tenant_id", "tenants"),
                            fk("account_id", "accounts"),
                            fk("uploaded_by", "users"),
                        ],
                    ),
                    entity(
                        "activities",
                        "activities",
                        vec![
                            f("id", Uuid),
                            f("tenant_id", Uuid),
                            f("user_id", Uuid),
                            f("account_id", Uuid),
                            f("contact_id", Uuid),
                            f("opportunity_id", Uuid),
                            f("kind", ACTIVITY_KIND),
                            f("occurred_at", Timestamp),
                            f("summary", Text),
                            f("metadata", Payload),
                            f("created_at", Timestamp),
                        ],
                        vec![
                            fk("tenant_id", "tenants"),
                            fk("user_id", "users"),
                            fk("account_id", "accounts"),
                            fk("contact_id", "contacts"),
                            fk("opportunity_id", "opportunities"),
                        ],
                    ),
                    entity(
                        "payments",
                        "payments",
                        vec![
                            f("id", Uuid),
                            f("invoice_id", Uuid),
                            f("currency_id", Uuid),
                            f("amount", Number),
                            f("method", PAYMENT_METHOD),
                            f("paid_at", Timestamp),
                            f("created_at", Timestamp),
                        ],
                        vec![fk("invoice_id", "invoices"), fk("currency_id", "currencies")],
                    ),
                    entity(
                        "comments",
                        "comments",
                        vec![
                            f("id", Uuid),
                            f("task_id", Uuid),
                            f("author_id", Uuid),
                            f("body", Text),
                            f("edited", Boolean),
                            f("created_at", Timestamp),
                            f("updated_at", Timestamp),
                        ],
                        vec![fk("task_id", "tasks"), fk("author_id", "users")],
                    ),
                ],
            },
            Phase {
                number: 6,
                tables: vec![
                    link(
                        "account_watchers",
                        fk("account_id", "accounts"),
                        fk("user_id", "users"),
                    ),
                    link(
                        "board_watchers",
                        fk("board_id", "boards"),
                        fk("user_id", "users"),
                    ),
                    link(
                        "opportunity_contacts",
                        fk("opportunity_id", "opportunities"),
                        fk("contact_id", "contacts"),
                    ),
                    link(
                        "document_invoices",
                        fk("document_id", "documents"),
                        fk("invoice_id", "invoices"),
                    ),
                    link(
                        "document_opportunities",
                        fk("document_id", "documents"),
                        fk("opportunity_id", "opportunities"),
                    ),
                    link(
                        "document_contacts",
                        fk("document_id", "documents"),
                        fk("contact_id", "contacts"),
                    ),
                    link(
                        "document_tasks",
                        fk("document_id", "documents"),
                        fk("task_id", "tasks"),
                    ),
                ],
            },
        ];

        let mut index = HashMap::new();
        for (pi, phase) in phases.iter().enumerate() {
            for (ti, table) in phase.tables.iter().enumerate() {
                index.insert(table.name, (pi, ti));
            }
        }

        Self { phases, index }
    }

    /// All phases in execution order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Entity phases only (everything before the terminal link phase).
    pub fn entity_phases(&self) -> &[Phase] {
        &self.phases[..self.phases.len() - 1]
    }

    /// The terminal link phase.
    pub fn link_phase(&self) -> &Phase {
        self.phases.last().expect("plan has phases")
    }

    /// Look up a table by target name.
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        let (pi, ti) = *self.index.get(name)?;
        Some(&self.phases[pi].tables[ti])
    }

    /// Whether `name` is a pure link table.
    pub fn is_link_table(&self, name: &str) -> bool {
        self.table(name).map(|t| t.is_link).unwrap_or(false)
    }

    /// 1-based phase number for a table.
    pub fn phase_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).map(|(pi, _)| self.phases[*pi].number)
    }

    /// All entity tables in execution order.
    pub fn entity_tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.entity_phases().iter().flat_map(|p| p.tables.iter())
    }

    /// All link tables.
    pub fn link_tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.link_phase().tables.iter()
    }

    /// Total number of phases.
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Total number of tables across all phases.
    pub fn table_count(&self) -> usize {
        self.index.len()
    }
}

impl Default for PhasePlan {
    fn default() -> Self {
        Self::standard()
    }
}

impl TableSpec {
    /// Field spec by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared reference target for a field, if it is a foreign key.
    pub fn fk_target(&self, field: &str) -> Option<&'static str> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.field == field)
            .map(|fk| fk.references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_counts() {
        let plan = PhasePlan::standard();
        assert_eq!(plan.phase_count(), 6);
        assert_eq!(plan.table_count(), 28);
        assert_eq!(plan.entity_tables().count(), 21);
        assert_eq!(plan.link_tables().count(), 7);
    }

    #[test]
    fn test_no_forward_dependencies() {
        let plan = PhasePlan::standard();
        for phase in plan.phases() {
            for table in &phase.tables {
                for fkey in &table.foreign_keys {
                    let ref_phase = plan
                        .phase_of(fkey.references)
                        .unwrap_or_else(|| panic!("{} references unknown table", table.name));
                    assert!(
                        ref_phase <= phase.number,
                        "{} (phase {}) references {} (phase {})",
                        table.name,
                        phase.number,
                        fkey.references,
                        ref_phase
                    );
                    // Same-phase references are only allowed for self-refs.
                    if ref_phase == phase.number {
                        assert_eq!(table.name, fkey.references);
                    }
                }
            }
        }
    }

    #[test]
    fn test_terminal_phase_is_all_links() {
        let plan = PhasePlan::standard();
        for table in &plan.link_phase().tables {
            assert!(table.is_link, "{} in terminal phase is not a link", table.name);
            assert_eq!(table.foreign_keys.len(), 2);
            assert_eq!(table.fields.len(), 2);
            assert!(table.collection.is_empty());
        }
        for table in plan.entity_tables() {
            assert!(!table.is_link);
            assert!(!table.collection.is_empty());
        }
    }

    #[test]
    fn test_every_entity_table_has_id_first() {
        let plan = PhasePlan::standard();
        for table in plan.entity_tables() {
            let first = &table.fields[0];
            assert_eq!(first.name, "id");
            assert!(matches!(first.kind, FieldKind::Uuid));
        }
    }

    #[test]
    fn test_fk_fields_are_declared_uuid() {
        let plan = PhasePlan::standard();
        for table in plan.phases().iter().flat_map(|p| p.tables.iter()) {
            for fkey in &table.foreign_keys {
                let field = table
                    .field(fkey.field)
                    .unwrap_or_else(|| panic!("{}.{} not in field list", table.name, fkey.field));
                assert!(matches!(field.kind, FieldKind::Uuid));
            }
        }
    }

    #[test]
    fn test_lookups() {
        let plan = PhasePlan::standard();
        assert_eq!(plan.phase_of("tenants"), Some(1));
        assert_eq!(plan.phase_of("accounts"), Some(3));
        assert_eq!(plan.phase_of("document_tasks"), Some(6));
        assert_eq!(plan.phase_of("nope"), None);
        assert!(plan.is_link_table("account_watchers"));
        assert!(!plan.is_link_table("accounts"));
        assert_eq!(
            plan.table("opportunities").unwrap().fk_target("stage_id"),
            Some("pipeline_stages")
        );
    }
}
