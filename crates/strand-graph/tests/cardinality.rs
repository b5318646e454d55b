//! Cardinality guard and relationship accessor against the in-memory graph.

mod common;

use common::{make, ogm, FakeGraph};
use strand_core::ScalarValue;
use strand_graph::{edge_props, CardinalityError, CheckMode, CompileError, GraphError, Side};

fn attempted(err: &GraphError) -> bool {
    matches!(
        err,
        GraphError::Cardinality(CardinalityError::AttemptedViolation { .. })
    )
}

#[tokio::test]
async fn test_one_connect_strict_fails_soft_records_notice() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let alice = make(&ogm, "Person", "Alice").await;
    let paris = make(&ogm, "City", "Paris").await;
    let london = make(&ogm, "City", "London").await;
    let city = ogm.relationship(&alice, "city").unwrap();

    let first = city
        .connect(&paris, Default::default(), CheckMode::Strict)
        .await
        .unwrap();
    assert!(first.notices.is_empty());

    let err = city
        .connect(&london, Default::default(), CheckMode::Strict)
        .await
        .unwrap_err();
    assert!(attempted(&err), "unexpected {err:?}");
    assert_eq!(graph.edges("LIVES_IN").len(), 1);

    let outcome = city
        .connect(&london, Default::default(), CheckMode::Soft)
        .await
        .unwrap();
    assert_eq!(outcome.notices.len(), 1);
    assert_eq!(outcome.notices[0].side, Side::Source);
    assert_eq!(outcome.notices[0].existing, 1);
    assert_eq!(graph.edges("LIVES_IN").len(), 2);

    // the overridden state is now visible on read
    match city.all().await.unwrap_err() {
        GraphError::Cardinality(CardinalityError::Violation { actual, .. }) => assert_eq!(actual, "2"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_reconnect_leaves_exactly_one_edge() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let alice = make(&ogm, "Person", "Alice").await;
    let paris = make(&ogm, "City", "Paris").await;
    let london = make(&ogm, "City", "London").await;
    let city = ogm.relationship(&alice, "city").unwrap();

    city.connect(&paris, Default::default(), CheckMode::Strict)
        .await
        .unwrap();
    city.reconnect(&paris, &london).await.unwrap();

    let edges = graph.edges("LIVES_IN");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].end, london.id.unwrap());
    assert!(city.is_connected(&london).await.unwrap());
    assert!(!city.is_connected(&paris).await.unwrap());
    assert_eq!(city.single().await.unwrap().unwrap().get("name"), Some(&ScalarValue::from("London")));
}

#[tokio::test]
async fn test_reconnect_after_soft_overconnect_keeps_one_edge() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let alice = make(&ogm, "Person", "Alice").await;
    let paris = make(&ogm, "City", "Paris").await;
    let london = make(&ogm, "City", "London").await;
    let rome = make(&ogm, "City", "Rome").await;
    let city = ogm.relationship(&alice, "city").unwrap();

    city.connect(&paris, Default::default(), CheckMode::Strict)
        .await
        .unwrap();
    city.connect(&london, Default::default(), CheckMode::Soft)
        .await
        .unwrap();
    assert_eq!(graph.edges("LIVES_IN").len(), 2);

    city.reconnect(&paris, &rome).await.unwrap();

    let edges = graph.edges("LIVES_IN");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].end, rome.id.unwrap());
    assert_eq!(city.single().await.unwrap().unwrap().get("name"), Some(&ScalarValue::from("Rome")));
}

#[tokio::test]
async fn test_reconnect_on_many_field_moves_one_edge_with_its_properties() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let alice = make(&ogm, "Person", "Alice").await;
    let bob = make(&ogm, "Person", "Bob").await;
    let carol = make(&ogm, "Person", "Carol").await;
    let dave = make(&ogm, "Person", "Dave").await;
    let friends = ogm.relationship(&alice, "friends").unwrap();

    friends
        .connect(&bob, edge_props([("since", 2001)]), CheckMode::Strict)
        .await
        .unwrap();
    friends
        .connect(&carol, Default::default(), CheckMode::Strict)
        .await
        .unwrap();
    friends.reconnect(&bob, &dave).await.unwrap();

    assert_eq!(graph.edges("FRIENDS_WITH").len(), 2);
    assert!(friends.is_connected(&carol).await.unwrap());
    assert!(!friends.is_connected(&bob).await.unwrap());
    let moved = friends.relationship(&dave).await.unwrap().unwrap();
    assert_eq!(moved.properties.get("since"), Some(&ScalarValue::Int(2001)));
}

#[tokio::test]
async fn test_reconnect_requires_existing_edge() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let alice = make(&ogm, "Person", "Alice").await;
    let paris = make(&ogm, "City", "Paris").await;
    let london = make(&ogm, "City", "London").await;
    let city = ogm.relationship(&alice, "city").unwrap();

    let err = city.reconnect(&paris, &london).await.unwrap_err();
    assert!(matches!(err, GraphError::NotConnected { ref field, .. } if field == "city"));

    // same node: nothing to do
    city.reconnect(&paris, &paris).await.unwrap();
    assert!(graph.edges("LIVES_IN").is_empty());
}

#[tokio::test]
async fn test_one_or_more_disconnect_guarded_in_every_mode() {
    let graph = FakeGraph::new();
    let mut settings = strand_core::config::MappingSettings::default();
    settings.soft_cardinality_check = true;
    let ogm = ogm(&graph).with_settings(settings);
    let alice = make(&ogm, "Person", "Alice").await;
    let rex = make(&ogm, "Pet", "Rex").await;
    let fido = make(&ogm, "Pet", "Fido").await;
    let pets = ogm.relationship(&alice, "pets").unwrap();
    assert_eq!(ogm.default_mode(), CheckMode::Soft);

    pets.connect(&rex, Default::default(), ogm.default_mode())
        .await
        .unwrap();
    assert!(attempted(&pets.disconnect(&rex).await.unwrap_err()));

    pets.connect(&fido, Default::default(), ogm.default_mode())
        .await
        .unwrap();
    pets.disconnect(&rex).await.unwrap();
    assert_eq!(pets.count().await.unwrap(), 1);

    assert!(attempted(&pets.disconnect(&fido).await.unwrap_err()));
    assert!(attempted(&pets.disconnect_all().await.unwrap_err()));
    assert_eq!(graph.edges("OWNS").len(), 1);
}

#[tokio::test]
async fn test_one_never_disconnects() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let alice = make(&ogm, "Person", "Alice").await;
    let paris = make(&ogm, "City", "Paris").await;
    let city = ogm.relationship(&alice, "city").unwrap();
    city.connect(&paris, Default::default(), CheckMode::Strict)
        .await
        .unwrap();

    assert!(attempted(&city.disconnect(&paris).await.unwrap_err()));
    let err = city.disconnect_all().await.unwrap_err();
    assert!(err.to_string().contains("use reconnect"));
    assert_eq!(graph.edges("LIVES_IN").len(), 1);
}

#[tokio::test]
async fn test_reads_detect_missing_required_edges() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let alice = make(&ogm, "Person", "Alice").await;

    let err = ogm.relationship(&alice, "city").unwrap().all().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "CardinalityViolation: Expected: one relationship in a outgoing direction of type LIVES_IN on node ({}) of class 'Person', got: none.",
            alice.id.unwrap()
        )
    );
    assert!(ogm.relationship(&alice, "pets").unwrap().single().await.is_err());
    assert_eq!(ogm.relationship(&alice, "employer").unwrap().single().await.unwrap(), None);
}

#[tokio::test]
async fn test_zero_or_one_read_with_two_edges() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let alice = make(&ogm, "Person", "Alice").await;
    let acme = make(&ogm, "Company", "Acme").await;
    let globex = make(&ogm, "Company", "Globex").await;
    graph.add_edge("WORKS_AT", alice.id.unwrap(), acme.id.unwrap());
    graph.add_edge("WORKS_AT", alice.id.unwrap(), globex.id.unwrap());

    let employer = ogm.relationship(&alice, "employer").unwrap();
    assert!(matches!(
        employer.single().await.unwrap_err(),
        GraphError::Cardinality(CardinalityError::Violation { .. })
    ));
    // count does not check
    assert_eq!(employer.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_inverse_side_checked_independently() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let bob = make(&ogm, "Person", "Bob").await;
    let carol = make(&ogm, "Person", "Carol").await;
    let acme = make(&ogm, "Company", "Acme").await;

    ogm.relationship(&bob, "leads")
        .unwrap()
        .connect(&acme, Default::default(), CheckMode::Strict)
        .await
        .unwrap();

    let leads = ogm.relationship(&carol, "leads").unwrap();
    let err = leads
        .connect(&acme, Default::default(), CheckMode::Strict)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("of class 'Company'"), "{err}");

    let outcome = leads
        .connect(&acme, Default::default(), CheckMode::Soft)
        .await
        .unwrap();
    assert_eq!(outcome.notices.len(), 1);
    assert_eq!(outcome.notices[0].side, Side::Target);
    assert_eq!(outcome.notices[0].field, "ceo");
}

#[tokio::test]
async fn test_replace_swaps_the_only_edge() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let alice = make(&ogm, "Person", "Alice").await;
    let acme = make(&ogm, "Company", "Acme").await;
    let globex = make(&ogm, "Company", "Globex").await;
    let employer = ogm.relationship(&alice, "employer").unwrap();

    employer
        .connect(&acme, Default::default(), CheckMode::Strict)
        .await
        .unwrap();
    let outcome = employer
        .replace(&globex, Default::default(), CheckMode::Strict)
        .await
        .unwrap();
    assert_eq!(outcome.edge.end, globex.id.unwrap());

    let edges = graph.edges("WORKS_AT");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].end, globex.id.unwrap());
}

#[tokio::test]
async fn test_edge_properties_through_edge_model() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let alice = make(&ogm, "Person", "Alice").await;
    let bob = make(&ogm, "Person", "Bob").await;
    let friends = ogm.relationship(&alice, "friends").unwrap();

    let outcome = friends
        .connect(&bob, edge_props([("since", 2015)]), CheckMode::Strict)
        .await
        .unwrap();
    assert_eq!(outcome.edge.get("since"), Some(&ScalarValue::Int(2015)));
    assert_eq!(outcome.edge.model.as_ref().map(|m| m.name.as_str()), Some("Friendship"));

    // undirected: visible from both ends
    let back = ogm.relationship(&bob, "friends").unwrap();
    assert!(back.is_connected(&alice).await.unwrap());
    let edge = back.relationship(&alice).await.unwrap().unwrap();
    assert_eq!(edge.id, outcome.edge.id);

    let err = friends
        .connect(&bob, edge_props([("nickname", "b")]), CheckMode::Strict)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Compile(CompileError::UnknownField { .. })));

    let acme = make(&ogm, "Company", "Acme").await;
    let err = ogm
        .relationship(&alice, "employer")
        .unwrap()
        .connect(&acme, edge_props([("since", 2020)]), CheckMode::Strict)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Compile(CompileError::NoEdgeModel { .. })));
}

#[tokio::test]
async fn test_connect_validates_target() {
    let graph = FakeGraph::new();
    let ogm = ogm(&graph);
    let alice = make(&ogm, "Person", "Alice").await;
    let rex = make(&ogm, "Pet", "Rex").await;
    let city = ogm.relationship(&alice, "city").unwrap();

    let err = city
        .connect(&rex, Default::default(), CheckMode::Strict)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::WrongTarget { ref expected, .. } if expected == "City"));

    let unsaved = strand_core::NodeInstance::new(ogm.registry().model("City", None).unwrap());
    assert!(matches!(
        city.connect(&unsaved, Default::default(), CheckMode::Strict).await,
        Err(GraphError::Unsaved { .. })
    ));
    assert!(matches!(
        ogm.relationship(&alice, "pets_typo"),
        Err(GraphError::Compile(CompileError::UnknownTraversal { .. }))
    ));
}
