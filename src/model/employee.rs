use serde::Serialize;
use utoipa::ToSchema;

/// Active employee that has no biometric id on file yet.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": 42,
    "employeeCode": "EMP-042",
    "firstName": "John",
    "lastName": "Doe"
}))]
pub struct UnmappedEmployee {
    pub id: u64,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
}
