use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MessageBody, parse_id};
use crate::{
    error::{AppError, AppResult},
    model::{
        CustomerPatch, CustomerRecord, CustomerView, FeedbackRecord, FeedbackReplacement,
        ResponsePatch, ResponseRecord,
    },
    state::AppState,
};

const MESSAGE_MIN_CHARS: usize = 3;
const MESSAGE_MAX_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerUpdated {
    pub message: &'static str,
    pub customer: CustomerView,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomersDeleted {
    pub message: &'static str,
    pub deleted_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateFeedbackRequest {
    pub email: Option<String>,
    pub message: Option<String>,
    pub satisfaction: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFeedbackRequest {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceFeedbackRequest {
    pub message: Option<String>,
    pub satisfaction: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerSummary {
    pub name: String,
    pub email: String,
}

impl From<&CustomerRecord> for CustomerSummary {
    fn from(customer: &CustomerRecord) -> Self {
        Self {
            name: customer.name.clone(),
            email: customer.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedbackWithCustomer {
    #[serde(flatten)]
    pub feedback: FeedbackRecord,
    pub customer: Option<CustomerSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerFeedbacks {
    pub customer: CustomerSummary,
    pub feedback_count: usize,
    pub feedbacks: Vec<FeedbackRecord>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackCreated {
    pub message: &'static str,
    pub feedback: FeedbackWithCustomer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponseRequest {
    pub feedback_id: Option<String>,
    pub response_message: Option<String>,
    pub responder: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponseRequest {
    pub response_message: Option<String>,
    pub responder: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResponseCreated {
    pub message: &'static str,
    pub response: ResponseRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallRating {
    pub average_rating: Option<f64>,
    pub count: usize,
}

pub async fn create_customer(
    State(state): State<AppState>,
    Json(payload): Json<CreateCustomerRequest>,
) -> AppResult<(StatusCode, Json<CustomerView>)> {
    let name = required(payload.name, "name")?;
    let email = validate_email(required(payload.email, "email")?)?;
    let password = required(payload.password, "password")?;

    let cost = state.password_hash_cost;
    let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|err| AppError::internal(format!("password hashing task failed: {err}")))?
        .map_err(|err| AppError::internal(format!("hash password: {err}")))?;

    let customer = state
        .records
        .insert_customer(CustomerRecord::new(name, email, password_hash))
        .await?;

    Ok((StatusCode::CREATED, Json(CustomerView::from(&customer))))
}

pub async fn list_customers(State(state): State<AppState>) -> AppResult<Json<Vec<CustomerView>>> {
    let customers = state.records.list_customers().await?;
    Ok(Json(customers.iter().map(CustomerView::from).collect()))
}

pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateCustomerRequest>,
) -> AppResult<Json<CustomerUpdated>> {
    let id = parse_id(&id, "customer")?;
    let patch = CustomerPatch {
        name: payload.name.map(|name| not_blank(name, "name")).transpose()?,
        email: payload.email.map(validate_email).transpose()?,
    };
    if !patch.has_changes() {
        return Err(AppError::validation("provide a name or an email to update"));
    }

    let customer = state.records.update_customer(id, patch).await?;
    Ok(Json(CustomerUpdated {
        message: "Customer updated successfully",
        last_updated: customer.updated_at,
        customer: CustomerView::from(&customer),
    }))
}

pub async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageBody>> {
    let id = parse_id(&id, "customer")?;
    state.records.delete_customer(id).await?;
    Ok(Json(MessageBody::new("Customer deleted")))
}

pub async fn delete_all_customers(
    State(state): State<AppState>,
) -> AppResult<Json<CustomersDeleted>> {
    let deleted_count = state.records.delete_all_customers().await?;
    Ok(Json(CustomersDeleted {
        message: "All customers deleted successfully",
        deleted_count,
    }))
}

/// The path segment is the customer's email.
pub async fn list_customer_feedbacks(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> AppResult<Json<CustomerFeedbacks>> {
    let customer = state
        .records
        .find_customer_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found("Customer not found"))?;

    let feedbacks = state.records.list_feedbacks_by_email(&customer.email).await?;
    Ok(Json(CustomerFeedbacks {
        customer: CustomerSummary::from(&customer),
        feedback_count: feedbacks.len(),
        feedbacks,
    }))
}

pub async fn create_feedback(
    State(state): State<AppState>,
    Json(payload): Json<CreateFeedbackRequest>,
) -> AppResult<(StatusCode, Json<FeedbackCreated>)> {
    let email = required(payload.email, "email")?;
    let message = validate_message(payload.message)?;
    let satisfaction = validate_satisfaction(payload.satisfaction)?;

    let customer = state
        .records
        .find_customer_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found("Customer not found. Please register first."))?;

    let feedback = state
        .records
        .insert_feedback(FeedbackRecord::new(email, message, satisfaction))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(FeedbackCreated {
            message: "Feedback created successfully",
            feedback: FeedbackWithCustomer {
                feedback,
                customer: Some(CustomerSummary::from(&customer)),
            },
        }),
    ))
}

pub async fn list_feedbacks(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<FeedbackWithCustomer>>> {
    let customers = state.records.list_customers().await?;
    let by_email: HashMap<&str, &CustomerRecord> = customers
        .iter()
        .map(|customer| (customer.email.as_str(), customer))
        .collect();

    let feedbacks = state
        .records
        .list_feedbacks()
        .await?
        .into_iter()
        .map(|feedback| FeedbackWithCustomer {
            customer: by_email
                .get(feedback.customer_email.as_str())
                .map(|customer| CustomerSummary::from(*customer)),
            feedback,
        })
        .collect();

    Ok(Json(feedbacks))
}

pub async fn update_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateFeedbackRequest>,
) -> AppResult<Json<FeedbackRecord>> {
    let id = parse_id(&id, "feedback")?;
    let message = validate_message(payload.message)?;
    let feedback = state.records.update_feedback_message(id, message).await?;
    Ok(Json(feedback))
}

pub async fn replace_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ReplaceFeedbackRequest>,
) -> AppResult<Json<FeedbackRecord>> {
    let id = parse_id(&id, "feedback")?;
    let replacement = FeedbackReplacement {
        message: validate_message(payload.message)?,
        satisfaction: validate_satisfaction(payload.satisfaction)?,
    };
    let feedback = state.records.replace_feedback(id, replacement).await?;
    Ok(Json(feedback))
}

pub async fn delete_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageBody>> {
    let id = parse_id(&id, "feedback")?;
    state.records.delete_feedback(id).await?;
    Ok(Json(MessageBody::new("Feedback deleted")))
}

pub async fn create_response(
    State(state): State<AppState>,
    Json(payload): Json<CreateResponseRequest>,
) -> AppResult<(StatusCode, Json<ResponseCreated>)> {
    let feedback_id = parse_id(&required(payload.feedback_id, "feedbackId")?, "feedback")?;
    let response_message = required(payload.response_message, "responseMessage")?;
    let responder = payload.responder.filter(|responder| !responder.trim().is_empty());

    let response = state
        .records
        .insert_response(ResponseRecord::new(feedback_id, response_message, responder))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ResponseCreated {
            message: "Response created successfully",
            response,
        }),
    ))
}

pub async fn list_responses(State(state): State<AppState>) -> AppResult<Json<Vec<ResponseRecord>>> {
    Ok(Json(state.records.list_responses().await?))
}

pub async fn update_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateResponseRequest>,
) -> AppResult<Json<ResponseRecord>> {
    let id = parse_id(&id, "response")?;
    let patch = ResponsePatch {
        response_message: payload
            .response_message
            .map(|message| not_blank(message, "responseMessage"))
            .transpose()?,
        responder: payload.responder,
    };
    if patch.response_message.is_none() && patch.responder.is_none() {
        return Err(AppError::validation(
            "provide a responseMessage or a responder to update",
        ));
    }

    Ok(Json(state.records.update_response(id, patch).await?))
}

pub async fn delete_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageBody>> {
    let id = parse_id(&id, "response")?;
    state.records.delete_response(id).await?;
    Ok(Json(MessageBody::new("Response deleted")))
}

pub async fn overall_rating(State(state): State<AppState>) -> AppResult<Json<OverallRating>> {
    let feedbacks = state.records.list_feedbacks().await?;
    let count = feedbacks.len();
    let average_rating = (count > 0).then(|| {
        let total: u64 = feedbacks
            .iter()
            .map(|feedback| u64::from(feedback.satisfaction))
            .sum();
        total as f64 / count as f64
    });

    Ok(Json(OverallRating {
        average_rating,
        count,
    }))
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    not_blank(
        value.ok_or_else(|| AppError::validation(format!("{field} is required")))?,
        field,
    )
}

fn not_blank(value: String, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

fn validate_email(email: String) -> AppResult<String> {
    let email = not_blank(email, "email")?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AppError::validation("email must be a valid address")),
    }
}

fn validate_message(message: Option<String>) -> AppResult<String> {
    let message = message
        .ok_or_else(|| AppError::validation("Feedback message is required"))?
        .trim()
        .to_string();
    let chars = message.chars().count();
    if chars < MESSAGE_MIN_CHARS {
        return Err(AppError::validation(
            "Message must be at least 3 characters long",
        ));
    }
    if chars > MESSAGE_MAX_CHARS {
        return Err(AppError::validation("Message cannot exceed 500 characters"));
    }
    Ok(message)
}

fn validate_satisfaction(satisfaction: Option<i64>) -> AppResult<u8> {
    let satisfaction =
        satisfaction.ok_or_else(|| AppError::validation("Satisfaction rating is required"))?;
    if !(1..=5).contains(&satisfaction) {
        return Err(AppError::validation("Rating must be between 1 and 5"));
    }
    u8::try_from(satisfaction).map_err(|_| AppError::validation("Rating must be between 1 and 5"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_bounds_are_enforced_after_trimming() {
        assert!(validate_message(Some("  ok  ".to_string())).is_err());
        assert_eq!(validate_message(Some(" good ".to_string())).unwrap(), "good");
        assert!(validate_message(Some("x".repeat(501))).is_err());
        assert!(validate_message(None).is_err());
    }

    #[test]
    fn satisfaction_must_be_between_one_and_five() {
        assert!(validate_satisfaction(Some(0)).is_err());
        assert!(validate_satisfaction(Some(6)).is_err());
        assert_eq!(validate_satisfaction(Some(5)).unwrap(), 5);
    }

    #[test]
    fn email_needs_local_and_domain_parts() {
        assert!(validate_email("a@x.com".to_string()).is_ok());
        assert!(validate_email("@x.com".to_string()).is_err());
        assert!(validate_email("ax.com".to_string()).is_err());
    }
}
