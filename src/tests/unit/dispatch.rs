// Dispatcher sweep and scheduler lifecycle tests

use chrono::Duration;
use std::time::Duration as StdDuration;

use crate::clock::Clock;
use crate::jobs::MessageScheduler;
use crate::models::{EnrollmentStatus, InteractionKind, MessageRecipient, MessageStatus};
use crate::tests::fixtures::{sample_lead, standalone_message, welcome_sequence};
use crate::tests::helpers::TestEngine;

#[tokio::test]
async fn test_sweep_sends_due_message_and_advances_enrollment() {
    let engine = TestEngine::new();
    let lead = sample_lead();
    let sequence = welcome_sequence();
    engine.store.add_lead(lead.clone());
    engine.store.add_sequence(sequence.clone());
    engine.enrollments.enroll(lead.id, sequence.id).await.unwrap();

    let job = engine.dispatch_job(5);
    let result = job.run().await.unwrap();

    assert_eq!(result.messages_checked, 1);
    assert_eq!(result.messages_sent, 1);
    assert_eq!(result.recipients_sent, 1);
    assert!(result.errors.is_empty());

    let sent = engine.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, lead.email);
    assert_eq!(sent[0].subject, "Welcome, Ana Torres!");

    let messages = engine.store.messages();
    assert_eq!(messages.len(), 2); // step 0 sent, step 1 queued by advance
    assert_eq!(messages[0].status, MessageStatus::Sent);
    assert_eq!(messages[0].sent_at, Some(engine.clock.now()));
    assert_eq!(messages[1].status, MessageStatus::Scheduled);
    assert_eq!(
        messages[1].scheduled_for,
        engine.clock.now() + Duration::days(2)
    );

    // Step 1 is still in the future, so an immediate second sweep is idle.
    let result = job.run().await.unwrap();
    assert_eq!(result.messages_checked, 0);
}

#[tokio::test]
async fn test_sequence_runs_to_completion_across_ticks() {
    let engine = TestEngine::new();
    let lead = sample_lead();
    let sequence = welcome_sequence();
    engine.store.add_lead(lead.clone());
    engine.store.add_sequence(sequence.clone());
    engine.enrollments.enroll(lead.id, sequence.id).await.unwrap();

    let job = engine.dispatch_job(5);

    job.run().await.unwrap(); // step 0
    engine.clock.advance(Duration::days(2));
    job.run().await.unwrap(); // step 1
    engine.clock.advance(Duration::weeks(1));
    job.run().await.unwrap(); // step 2, advance completes the enrollment

    assert_eq!(engine.transport.sent().len(), 3);
    assert_eq!(
        engine.store.enrollments()[0].status,
        EnrollmentStatus::Completed
    );

    let sequence_sends = engine
        .store
        .interactions()
        .into_iter()
        .filter(|i| i.kind == InteractionKind::SequenceMessageSent)
        .count();
    assert_eq!(sequence_sends, 3);
}

#[tokio::test]
async fn test_one_failed_recipient_does_not_abort_the_rest() {
    let engine = TestEngine::new();
    let lead = sample_lead();
    engine.store.add_lead(lead.clone());
    engine.store.add_message(standalone_message(
        lead.id,
        vec![
            MessageRecipient::new("a@example.com", None),
            MessageRecipient::new("b@example.com", None),
            MessageRecipient::new("c@example.com", None),
        ],
    ));
    engine.transport.fail_address("b@example.com");

    let job = engine.dispatch_job(5);
    let result = job.run().await.unwrap();

    assert_eq!(result.recipients_sent, 2);
    assert_eq!(result.recipients_failed, 1);
    assert_eq!(result.messages_sent, 0);

    let message = &engine.store.messages()[0];
    assert_eq!(message.status, MessageStatus::Scheduled);
    assert_eq!(message.attempts, 1);
    assert!(message.recipients[0].sent);
    assert!(!message.recipients[1].sent);
    assert!(message.recipients[1].last_error.is_some());
    assert!(message.recipients[2].sent);

    // Next sweep retries only the outstanding recipient.
    engine.transport.clear_failures();
    let result = job.run().await.unwrap();
    assert_eq!(result.recipients_sent, 1);
    assert_eq!(result.messages_sent, 1);

    let message = &engine.store.messages()[0];
    assert_eq!(message.status, MessageStatus::Sent);
    assert_eq!(engine.transport.sent_to("a@example.com").len(), 1);
    assert_eq!(engine.transport.sent_to("b@example.com").len(), 1);
}

#[tokio::test]
async fn test_message_fails_terminally_after_max_attempts() {
    let engine = TestEngine::new();
    let lead = sample_lead();
    engine.store.add_lead(lead.clone());
    engine.store.add_message(standalone_message(
        lead.id,
        vec![MessageRecipient::new("bounce@example.com", None)],
    ));
    engine.transport.fail_address("bounce@example.com");

    let job = engine.dispatch_job(2);
    job.run().await.unwrap();
    assert_eq!(engine.store.messages()[0].status, MessageStatus::Scheduled);

    let result = job.run().await.unwrap();
    assert_eq!(engine.store.messages()[0].status, MessageStatus::Failed);
    assert_eq!(result.errors.len(), 1);

    // Failed messages are terminal and leave the sweep.
    let result = job.run().await.unwrap();
    assert_eq!(result.messages_checked, 0);
}

#[tokio::test]
async fn test_paused_enrollment_messages_are_skipped() {
    let engine = TestEngine::new();
    let lead = sample_lead();
    let sequence = welcome_sequence();
    engine.store.add_lead(lead.clone());
    engine.store.add_sequence(sequence.clone());
    engine.enrollments.enroll(lead.id, sequence.id).await.unwrap();
    engine.enrollments.pause(lead.id, sequence.id).await.unwrap();

    let job = engine.dispatch_job(5);
    let result = job.run().await.unwrap();

    assert_eq!(result.messages_sent, 0);
    assert!(engine.transport.sent().is_empty());
    assert_eq!(engine.store.messages()[0].status, MessageStatus::Scheduled);

    engine.enrollments.resume(lead.id, sequence.id).await.unwrap();
    let result = job.run().await.unwrap();
    assert_eq!(result.messages_sent, 1);
    assert_eq!(engine.transport.sent().len(), 1);
}

#[tokio::test]
async fn test_standalone_message_does_not_touch_enrollments() {
    let engine = TestEngine::new();
    let lead = sample_lead();
    engine.store.add_lead(lead.clone());
    engine.store.add_message(standalone_message(
        lead.id,
        vec![MessageRecipient::new(lead.email.clone(), None)],
    ));

    let job = engine.dispatch_job(5);
    job.run().await.unwrap();

    assert_eq!(engine.store.messages()[0].status, MessageStatus::Sent);
    assert!(!engine.transport.sent()[0].is_rich);
    assert!(engine.store.enrollments().is_empty());
    assert!(engine.store.interactions().is_empty());
}

#[tokio::test]
async fn test_scheduler_start_stop_are_idempotent() {
    let engine = TestEngine::new();
    let scheduler = MessageScheduler::new(
        engine.dispatch_job(5),
        StdDuration::from_secs(3600),
    );

    assert!(scheduler.start());
    assert!(scheduler.is_running());
    assert!(!scheduler.start());

    assert!(scheduler.stop());
    assert!(!scheduler.is_running());
    assert!(!scheduler.stop());
}

#[tokio::test]
async fn test_scheduler_timer_runs_sweeps() {
    let engine = TestEngine::new();
    let lead = sample_lead();
    engine.store.add_lead(lead.clone());
    engine.store.add_message(standalone_message(
        lead.id,
        vec![MessageRecipient::new(lead.email.clone(), None)],
    ));

    let scheduler = MessageScheduler::new(
        engine.dispatch_job(5),
        StdDuration::from_millis(20),
    );
    assert!(scheduler.start());
    tokio::time::sleep(StdDuration::from_millis(200)).await;
    assert!(scheduler.stop());

    assert_eq!(engine.transport.sent().len(), 1);
    let runs = scheduler.recent_runs().await;
    assert!(!runs.is_empty());
    assert_eq!(runs[0].result.messages_sent, 1);
}

#[tokio::test]
async fn test_run_now_sweeps_outside_the_timer() {
    let engine = TestEngine::new();
    let lead = sample_lead();
    engine.store.add_lead(lead.clone());
    engine.store.add_message(standalone_message(
        lead.id,
        vec![MessageRecipient::new(lead.email.clone(), None)],
    ));

    let scheduler = MessageScheduler::new(
        engine.dispatch_job(5),
        StdDuration::from_secs(3600),
    );
    let result = scheduler.run_now().await.unwrap();
    assert_eq!(result.messages_sent, 1);
    assert!(scheduler.recent_runs().await.is_empty());
}
