//! Slot, booking and minutes flow across several connections

mod integration_harness;

use integration_harness::TestServer;
use meeting_protocol::{Role, StatusCode};

const DAY: &str = "2030-01-15";

/// Field `index` of the single `&` record in a list payload
fn record_field(payload: &str, index: usize) -> String {
    let record = payload.split("||").nth(1).expect("missing record");
    record.split('&').nth(index).expect("missing field").to_owned()
}

#[tokio::test]
async fn test_individual_booking_flow() {
    let server = TestServer::start().await;
    let (mut teacher, _) = server.user("tina", Role::Teacher).await;
    let (mut student, _) = server.user("sam", Role::Student).await;

    let res = teacher
        .call("ADD_SLOT", &format!("{DAY}||09:00||10:00||0"))
        .await
        .unwrap();
    assert_eq!(res.status, StatusCode::Ok);
    let slot_id = res.fields()[1].clone();

    // overlapping slot for the same teacher
    let res = teacher
        .call("ADD_SLOT", &format!("{DAY}||09:30||10:30||0"))
        .await
        .unwrap();
    assert_eq!(res.payload, "ADD_SLOT_TIME_OVERLAP");

    let res = student.call("LIST_FREE_SLOTS", "").await.unwrap();
    assert_eq!(
        res.payload,
        format!("LIST_FREE_SLOTS_SUCCESS||{slot_id}&1&tina&{DAY} 09:00:00&{DAY} 10:00:00&Individual")
    );
    let teacher_id = record_field(&res.payload, 1);

    let res = student
        .call("BOOK_INDIVIDUAL", &format!("{teacher_id}&{slot_id}"))
        .await
        .unwrap();
    assert_eq!(res.status, StatusCode::Ok);
    let meeting_id = res.fields()[1].clone();

    // booked slots disappear from the free list and cannot be deleted
    let res = student.call("LIST_FREE_SLOTS", "").await.unwrap();
    assert_eq!(res.payload, "LIST_FREE_SLOTS_SUCCESS||EMPTY");
    let res = teacher.call("DELETE_SLOT", &slot_id).await.unwrap();
    assert_eq!(res.payload, "DELETE_SLOT_IN_USE");

    let res = teacher.call("LIST_APPOINTMENTS", "").await.unwrap();
    assert_eq!(record_field(&res.payload, 0), meeting_id);
    assert_eq!(record_field(&res.payload, 3), "sam");

    let res = student.call("LIST_MEETINGS", "").await.unwrap();
    assert_eq!(record_field(&res.payload, 0), meeting_id);
    assert_eq!(record_field(&res.payload, 3), "tina");

    let res = student.call("CANCEL_MEETING", &meeting_id).await.unwrap();
    assert_eq!(res.payload, "CANCEL_MEETING_SUCCESS");
    let res = student.call("LIST_FREE_SLOTS", &teacher_id).await.unwrap();
    assert_eq!(record_field(&res.payload, 0), slot_id);

    server.stop().await;
}

#[tokio::test]
async fn test_group_booking_and_minutes() {
    let server = TestServer::start().await;
    let (mut teacher, _) = server.user("tina", Role::Teacher).await;
    let (mut booker, _) = server.user("sam", Role::Student).await;
    let (mut member, _) = server.user("max", Role::Student).await;
    let (mut outsider, _) = server.user("olga", Role::Student).await;

    let res = teacher
        .call("ADD_SLOT", &format!("{DAY}||14:00||15:00||1"))
        .await
        .unwrap();
    let slot_id = res.fields()[1].clone();

    let res = teacher.call("LIST_ALL_STUDENTS", "").await.unwrap();
    let max_id = res
        .fields()
        .iter()
        .find(|record| record.ends_with("&max"))
        .and_then(|record| record.split('&').next().map(str::to_owned))
        .expect("max is listed");

    // an individual booking does not fit a group slot
    let res = booker
        .call("BOOK_INDIVIDUAL", &format!("1&{slot_id}"))
        .await
        .unwrap();
    assert_eq!(res.payload, "BOOK_INDIVIDUAL_SLOT_NOT_SUITABLE");

    let res = booker
        .call("BOOK_GROUP", &format!("1&{slot_id}&{max_id}"))
        .await
        .unwrap();
    assert_eq!(res.status, StatusCode::Ok);
    let meeting_id = res.fields()[1].clone();

    let res = member.call("LIST_MEETINGS", "").await.unwrap();
    assert_eq!(record_field(&res.payload, 0), meeting_id);
    assert_eq!(record_field(&res.payload, 4), "1");

    // minutes may contain the frame delimiter
    let res = teacher
        .call("ADD_MINUTES", &format!("{meeting_id}||Agenda||Next steps"))
        .await
        .unwrap();
    assert_eq!(res.payload, "ADD_MINUTES_SUCCESS");

    let res = member.call("GET_MINUTES", &meeting_id).await.unwrap();
    assert_eq!(res.payload, "GET_MINUTES_SUCCESS||Agenda||Next steps");

    let res = outsider.call("GET_MINUTES", &meeting_id).await.unwrap();
    assert_eq!(res.status, StatusCode::Forbidden);

    // only the booker may cancel
    let res = member.call("CANCEL_MEETING", &meeting_id).await.unwrap();
    assert_eq!(res.status, StatusCode::Forbidden);

    let booker_id = {
        let res = teacher.call("LIST_STUDENTS", "").await.unwrap();
        res.fields()
            .iter()
            .find(|record| record.ends_with("&sam"))
            .and_then(|record| record.split('&').next().map(str::to_owned))
            .expect("sam is listed")
    };
    let res = teacher.call("VIEW_HISTORY", &booker_id).await.unwrap();
    assert_eq!(
        res.payload,
        format!("VIEW_HISTORY_SUCCESS||{meeting_id}&{DAY} 14:00:00&1")
    );

    server.stop().await;
}
