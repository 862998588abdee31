mod common;

use std::{sync::Arc, time::Duration};

use common::*;
use slotwatch::{
    CheckLane, Website,
    history::CheckHistory,
    notifier::outbox,
    requests::Method,
    scheduler::CheckIntervals,
    session_client::CALENDAR_PATH,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const HOUR: CheckIntervals = CheckIntervals {
    day: Duration::from_secs(3600),
    night: Duration::from_secs(3600),
};

#[tokio::test]
async fn found_slots_are_sent_to_every_chat() {
    let site = Arc::new(ScriptedSite::default());
    script_login(&site, "kd4xqz");
    site.on(Method::Get, url("/queue/Rlist.aspx?nm=BIOPASSPORT"), html(FORM_PAGE))
        .on(Method::Post, url("/queue/Rlist.aspx?nm=BIOPASSPORT"), redirect(CALENDAR_PATH))
        .on(Method::Get, url(CALENDAR_PATH), html(ONE_SLOT))
        .on(Method::Post, url(CALENDAR_PATH), html(NO_SLOTS));
    let engine = engine(
        site,
        Arc::new(CannedOcr::reading(&["022880"])),
        3,
        scratch_dir("lane-found"),
    );
    let history = Arc::new(Mutex::new(CheckHistory::new()));
    let (outbox, mut inbox) = outbox(8);
    let lane = CheckLane::new(Website::HAGUE, engine, HOUR, history.clone(), outbox, vec![7, 8]);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(lane.run(cancel.clone()));

    let first = inbox.recv().await.unwrap();
    let second = inbox.recv().await.unwrap();
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!((first.chat_id, second.chat_id), (7, 8));
    assert_eq!(
        first.text,
        "Found 1 available slots on https://hague.kdmid.ru/ !!!\n* 2024-05-07 12:25 (Окно 3)"
    );
    assert_eq!(first.text, second.text);

    let history = history.lock().await;
    assert_eq!(history.stats(), "Successful attempts: 1/1 (100%)");
    assert!(history.entries().next().unwrap().ends_with(": Found 1 slots"));
}

#[tokio::test]
async fn failed_checks_are_recorded_without_notifying() {
    let site = Arc::new(ScriptedSite::default());
    let engine = engine(
        site,
        Arc::new(CannedOcr::reading(&["022880"])),
        3,
        scratch_dir("lane-failed"),
    );
    let history = Arc::new(Mutex::new(CheckHistory::new()));
    let (outbox, mut inbox) = outbox(8);
    let lane = CheckLane::new(Website::HAGUE, engine, HOUR, history.clone(), outbox, vec![7]);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(lane.run(cancel.clone()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while history.lock().await.stats() != "Successful attempts: 0/1 (0%)" {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    cancel.cancel();
    handle.await.unwrap();

    assert!(inbox.try_recv().is_err());
    let history = history.lock().await;
    assert!(
        history
            .entries()
            .next()
            .unwrap()
            .ends_with(": captcha image is not on the page")
    );
}

#[tokio::test]
async fn cancel_stops_an_idle_lane() {
    let site = Arc::new(ScriptedSite::default());
    site.on(Method::Get, url(CALENDAR_PATH), html(NO_SLOTS));
    let engine = engine(
        site,
        Arc::new(CannedOcr::reading(&["022880"])),
        3,
        scratch_dir("lane-cancel"),
    );
    let (outbox, _inbox) = outbox(8);
    let lane = CheckLane::new(
        Website::HAGUE,
        engine,
        HOUR,
        Arc::new(Mutex::new(CheckHistory::new())),
        outbox,
        Vec::new(),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), lane.run(cancel))
        .await
        .unwrap();
}
