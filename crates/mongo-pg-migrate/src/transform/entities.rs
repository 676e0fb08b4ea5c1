//! Per-table transformers, one function per entity kind.
//!
//! Each function mirrors its table's field list in the phase plan exactly:
//! the validator re-runs these transformers against source documents and
//! compares field-by-field, so a field emitted here but absent from the
//! plan (or vice versa) is a bug.

use super::Tx;
use crate::error::Result;
use crate::idmap::IdMapper;
use crate::plan::{
    ACTIVITY_KIND, CHANNEL, INDUSTRY, INVOICE_STATUS, OPPORTUNITY_STATUS, PAYMENT_METHOD,
    PRIORITY, TASK_STATUS, TENANT_PLAN, TENANT_STATUS, USER_STATUS, VISIBILITY,
};
use crate::store::Record;
use serde_json::Value;

pub(super) fn tenants(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("tenants", doc, mapper)?;
    t.required_text("name", "name")?;
    t.enumerated("plan", "plan", TENANT_PLAN)
        .enumerated("status", "status", TENANT_STATUS)
        .payload("settings", "settings")
        .timestamp("created_at", "createdAt")
        .timestamp("updated_at", "updatedAt");
    Ok(t.finish())
}

pub(super) fn currencies(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("currencies", doc, mapper)?;
    t.required_text("code", "code")?;
    t.text("name", "name")
        .text("symbol", "symbol")
        .number("decimal_places", "decimalPlaces")
        .timestamp("created_at", "createdAt");
    Ok(t.finish())
}

pub(super) fn roles(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("roles", doc, mapper)?;
    t.required_text("name", "name")?;
    t.payload("permissions", "permissions")
        .boolean("is_system", "isSystem")
        .timestamp("created_at", "createdAt");
    Ok(t.finish())
}

pub(super) fn product_categories(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("product_categories", doc, mapper)?;
    t.required_text("name", "name")?;
    t.text("description", "description")
        .timestamp("created_at", "createdAt");
    Ok(t.finish())
}

pub(super) fn users(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("users", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId")
        .foreign_key("role_id", "roleId");
    t.required_text("email", "email")?;
    t.text("full_name", "fullName")
        .enumerated("status", "status", USER_STATUS)
        .timestamp("last_login_at", "lastLoginAt")
        .timestamp("created_at", "createdAt")
        .timestamp("updated_at", "updatedAt");
    Ok(t.finish())
}

pub(super) fn teams(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("teams", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId");
    t.required_text("name", "name")?;
    t.text("description", "description")
        .timestamp("created_at", "createdAt");
    Ok(t.finish())
}

pub(super) fn pipelines(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("pipelines", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId");
    t.required_text("name", "name")?;
    t.boolean("is_default", "isDefault")
        .timestamp("created_at", "createdAt");
    Ok(t.finish())
}

pub(super) fn products(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("products", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId")
        .foreign_key("category_id", "categoryId")
        .foreign_key("currency_id", "currencyId")
        .text("sku", "sku");
    t.required_text("name", "name")?;
    t.number("unit_price", "unitPrice")
        .boolean("active", "active")
        .payload("attributes", "attributes")
        .timestamp("created_at", "createdAt")
        .timestamp("updated_at", "updatedAt");
    Ok(t.finish())
}

pub(super) fn email_templates(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("email_templates", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId");
    t.required_text("name", "name")?;
    t.text("subject", "subject")
        .text("body", "body")
        .timestamp("created_at", "createdAt")
        .timestamp("updated_at", "updatedAt");
    Ok(t.finish())
}

pub(super) fn accounts(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("accounts", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId")
        .foreign_key("owner_id", "ownerId")
        .foreign_key("currency_id", "currencyId")
        .foreign_key("parent_account_id", "parentAccountId");
    t.required_text("name", "name")?;
    t.enumerated("industry", "industry", INDUSTRY)
        .number("annual_revenue", "annualRevenue")
        .text("website", "website")
        .payload("tags", "tags")
        .timestamp("created_at", "createdAt")
        .timestamp("updated_at", "updatedAt");
    Ok(t.finish())
}

pub(super) fn boards(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("boards", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId")
        .foreign_key("owner_id", "ownerId");
    t.required_text("name", "name")?;
    t.enumerated("visibility", "visibility", VISIBILITY)
        .timestamp("created_at", "createdAt")
        .timestamp("updated_at", "updatedAt");
    Ok(t.finish())
}

pub(super) fn campaigns(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("campaigns", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId")
        .foreign_key("owner_id", "ownerId")
        .foreign_key("email_template_id", "emailTemplateId");
    t.required_text("name", "name")?;
    t.enumerated("channel", "channel", CHANNEL)
        .number("budget", "budget")
        .timestamp("starts_at", "startsAt")
        .timestamp("ends_at", "endsAt")
        .timestamp("created_at", "createdAt");
    Ok(t.finish())
}

pub(super) fn pipeline_stages(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("pipeline_stages", doc, mapper)?;
    t.foreign_key("pipeline_id", "pipelineId");
    t.required_text("name", "name")?;
    t.number("position", "position")
        .number("probability", "probability")
        .timestamp("created_at", "createdAt");
    Ok(t.finish())
}

pub(super) fn contacts(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("contacts", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId")
        .foreign_key("account_id", "accountId")
        .foreign_key("owner_id", "ownerId")
        .text("first_name", "firstName");
    t.required_text("last_name", "lastName")?;
    t.text("email", "email")
        .text("phone", "phone")
        .text("title", "title")
        .payload("tags", "tags")
        .timestamp("created_at", "createdAt")
        .timestamp("updated_at", "updatedAt");
    Ok(t.finish())
}

pub(super) fn opportunities(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("opportunities", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId")
        .foreign_key("account_id", "accountId")
        .foreign_key("stage_id", "stageId")
        .foreign_key("owner_id", "ownerId")
        .foreign_key("campaign_id", "campaignId")
        .foreign_key("currency_id", "currencyId");
    t.required_text("name", "name")?;
    t.number("amount", "amount")
        .enumerated("status", "status", OPPORTUNITY_STATUS)
        .timestamp("expected_close_at", "expectedCloseAt")
        .timestamp("created_at", "createdAt")
        .timestamp("updated_at", "updatedAt");
    Ok(t.finish())
}

pub(super) fn invoices(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("invoices", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId")
        .foreign_key("account_id", "accountId")
        .foreign_key("currency_id", "currencyId");
    t.required_text("number", "number")?;
    t.enumerated("status", "status", INVOICE_STATUS)
        .timestamp("issued_at", "issuedAt")
        .timestamp("due_at", "dueAt")
        .number("total", "total")
        .payload("line_items", "lineItems")
        .timestamp("created_at", "createdAt")
        .timestamp("updated_at", "updatedAt");
    Ok(t.finish())
}

pub(super) fn tasks(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("tasks", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId")
        .foreign_key("board_id", "boardId")
        .foreign_key("assignee_id", "assigneeId")
        .foreign_key("account_id", "accountId");
    t.required_text("title", "title")?;
    t.enumerated("status", "status", TASK_STATUS)
        .enumerated("priority", "priority", PRIORITY)
        .timestamp("due_at", "dueAt")
        .timestamp("created_at", "createdAt")
        .timestamp("updated_at", "updatedAt");
    Ok(t.finish())
}

pub(super) fn documents(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("documents", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId")
        .foreign_key("account_id", "accountId")
        .foreign_key("uploaded_by", "uploadedBy");
    t.required_text("file_name", "fileName")?;
    t.text("mime_type", "mimeType")
        .number("size_bytes", "sizeBytes")
        .text("storage_key", "storageKey")
        .timestamp("created_at", "createdAt");
    Ok(t.finish())
}

pub(super) fn activities(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("activities", doc, mapper)?;
    t.foreign_key("tenant_id", "tenantId")
        .foreign_key("user_id", "userId")
        .foreign_key("account_id", "accountId")
        .foreign_key("contact_id", "contactId")
        .foreign_key("opportunity_id", "opportunityId")
        .enumerated("kind", "kind", ACTIVITY_KIND)
        .timestamp("occurred_at", "occurredAt")
        .text("summary", "summary")
        .payload("metadata", "metadata")
        .timestamp("created_at", "createdAt");
    Ok(t.finish())
}

pub(super) fn payments(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("payments", doc, mapper)?;
    t.foreign_key("invoice_id", "invoiceId")
        .foreign_key("currency_id", "currencyId");
    t.required_number("amount", "amount")?;
    t.enumerated("method", "method", PAYMENT_METHOD)
        .timestamp("paid_at", "paidAt")
        .timestamp("created_at", "createdAt");
    Ok(t.finish())
}

pub(super) fn comments(doc: &Value, mapper: &IdMapper) -> Result<Record> {
    let mut t = Tx::new("comments", doc, mapper)?;
    t.foreign_key("task_id", "taskId")
        .foreign_key("author_id", "authorId");
    t.required_text("body", "body")?;
    t.boolean("edited", "edited")
        .timestamp("created_at", "createdAt")
        .timestamp("updated_at", "updatedAt");
    Ok(t.finish())
}
