// src/api/handlers/ws.rs
use actix::{Actor, StreamHandler, Handler, Message, Addr, AsyncContext};
use actix_web::{web, HttpRequest, HttpResponse, Error};
use actix_web_actors::ws;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use crate::models::{DocumentOutcome, Grade};
use crate::runner::ProgressSink;

/// Per-document outcome pushed to connected dashboards.
#[derive(Message, Clone, Debug, Serialize, PartialEq)]
#[rtype(result = "()")]
#[serde(rename_all = "camelCase")]
pub struct GradeUpdate {
    pub batch_id: Option<String>,
    pub document_url: String,
    pub status: String,
    pub grade_id: Option<String>,
    pub reason: Option<String>,
}

impl GradeUpdate {
    pub fn graded(grade: &Grade) -> Self {
        Self {
            batch_id: grade.batch_id.clone(),
            document_url: grade.file_url.clone(),
            status: "graded".to_string(),
            grade_id: Some(grade.id.clone()),
            reason: None,
        }
    }

    pub fn from_outcome(batch_id: &str, outcome: &DocumentOutcome) -> Self {
        match outcome {
            DocumentOutcome::Graded(success) => Self {
                batch_id: Some(batch_id.to_string()),
                document_url: success.document_url.clone(),
                status: "graded".to_string(),
                grade_id: Some(success.grade_id.clone()),
                reason: None,
            },
            DocumentOutcome::Failed(failure) => Self {
                batch_id: Some(batch_id.to_string()),
                document_url: failure.document_url.clone(),
                status: "failed".to_string(),
                grade_id: None,
                reason: Some(failure.reason.to_string()),
            },
        }
    }
}

#[derive(Clone, Default)]
pub struct WsBroker {
    clients: Arc<RwLock<Vec<Addr<WsConnection>>>>,
}

impl WsBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, addr: Addr<WsConnection>) {
        let mut clients = self.clients.write().await;
        clients.push(addr);
    }

    pub async fn unregister(&self, addr: &Addr<WsConnection>) {
        let mut clients = self.clients.write().await;
        clients.retain(|c| c != addr);
    }

    pub async fn broadcast(&self, msg: GradeUpdate) {
        let clients = self.clients.read().await;
        for client in clients.iter() {
            client.do_send(msg.clone());
        }
    }
}

#[async_trait]
impl ProgressSink for WsBroker {
    async fn document_finished(&self, batch_id: &str, outcome: &DocumentOutcome) {
        self.broadcast(GradeUpdate::from_outcome(batch_id, outcome)).await;
    }
}

pub struct WsConnection {
    broker: WsBroker,
}

impl WsConnection {
    pub fn new(broker: WsBroker) -> Self {
        Self { broker }
    }
}

impl Actor for WsConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let addr = ctx.address();
        let broker = self.broker.clone();
        actix::spawn(async move {
            broker.register(addr).await;
        });
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        let addr = ctx.address();
        let broker = self.broker.clone();
        actix::spawn(async move {
            broker.unregister(&addr).await;
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Close(reason)) => ctx.close(reason),
            _ => (),
        }
    }
}

impl Handler<GradeUpdate> for WsConnection {
    type Result = ();

    fn handle(&mut self, msg: GradeUpdate, ctx: &mut Self::Context) {
        if let Ok(json) = serde_json::to_string(&msg) {
            ctx.text(json);
        }
    }
}

pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    broker: web::Data<WsBroker>,
) -> Result<HttpResponse, Error> {
    let conn = WsConnection::new(broker.get_ref().clone());
    ws::start(conn, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureReason;
    use crate::models::{DocumentFailure, DocumentSuccess};

    #[test]
    fn test_outcome_updates() {
        let graded = GradeUpdate::from_outcome(
            "b1",
            &DocumentOutcome::Graded(DocumentSuccess {
                document_url: "d1".to_string(),
                grade_id: "g1".to_string(),
            }),
        );
        assert_eq!(graded.status, "graded");
        assert_eq!(graded.grade_id.as_deref(), Some("g1"));
        assert_eq!(graded.batch_id.as_deref(), Some("b1"));

        let failed = GradeUpdate::from_outcome(
            "b1",
            &DocumentOutcome::Failed(DocumentFailure {
                document_url: "d2".to_string(),
                reason: FailureReason::MalformedResultError,
                message: "missing <finalScore> tag".to_string(),
            }),
        );
        assert_eq!(failed.status, "failed");
        assert!(failed.grade_id.is_none());
        assert_eq!(failed.reason.as_deref(), Some("MalformedResultError"));
    }

    #[tokio::test]
    async fn test_broker_without_clients_accepts_progress() {
        let broker = WsBroker::new();
        let outcome = DocumentOutcome::Graded(DocumentSuccess {
            document_url: "d1".to_string(),
            grade_id: "g1".to_string(),
        });
        broker.document_finished("b1", &outcome).await;
        assert!(broker.clients.read().await.is_empty());
    }
}
