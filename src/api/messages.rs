use actix_web::{get, patch, post, web, HttpResponse, Responder, Scope};
use serde::Deserialize;

use crate::{
    error::Error,
    message::{ReadReceipt, SubmitMessage},
    service::Service,
};

#[post("")]
async fn submit_message(
    service: web::Data<Service>,
    body: web::Json<SubmitMessage>,
) -> Result<impl Responder, Error> {
    let receipt = service.submit_message(body.into_inner()).await?;

    Ok(HttpResponse::Accepted().json(receipt))
}

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    user_a: Option<String>,
    user_b: Option<String>,
}

#[get("")]
async fn get_conversation(
    service: web::Data<Service>,
    query: web::Query<ConversationQuery>,
) -> Result<impl Responder, Error> {
    let query = query.into_inner();

    let user_a = query
        .user_a
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::missing_parameter("user_a"))?;

    let user_b = query
        .user_b
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::missing_parameter("user_b"))?;

    let messages = service.get_conversation(user_a, user_b).await?;

    Ok(web::Json(messages))
}

#[patch("/{message_id}/read")]
async fn mark_read(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    service.mark_read(&*path).await?;

    Ok(web::Json(ReadReceipt::read()))
}

pub fn service() -> Scope {
    web::scope("/messages")
        .service(submit_message)
        .service(get_conversation)
        .service(mark_read)
}
