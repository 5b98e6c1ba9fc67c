// RabbitMQ plumbing for the booking work queue: durable declare, publish,
// and consumer construction. Delivery acknowledgement stays with the
// consumer loop, which decides ack/nack/reject per message.
use boxoffice_common::{ReservationRequest, Result};
use lapin::{
    options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
};
use tracing::info;

pub struct BookingQueue {
    // Dropping the connection closes every channel; keep it alive for the
    // lifetime of the queue handle.
    _conn: Connection,
    channel: Channel,
    queue_name: String,
}

impl BookingQueue {
    pub async fn connect(amqp_url: &str, queue_name: &str) -> Result<Self> {
        let conn = Connection::connect(amqp_url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        info!("declared durable queue {:?}", queue_name);
        Ok(Self {
            _conn: conn,
            channel,
            queue_name: queue_name.to_string(),
        })
    }

    /// Publishes a reservation request under the booking routing key and
    /// waits for broker confirmation of the enqueue, not of the booking.
    pub async fn publish(&self, request: &ReservationRequest) -> Result<()> {
        let body = serde_json::to_vec(request)?;
        self.channel
            .basic_publish(
                "",
                &self.queue_name,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?
            .await?;
        Ok(())
    }

    pub async fn consumer(&self, tag: &str) -> Result<Consumer> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(consumer)
    }
}
