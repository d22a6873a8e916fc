use std::sync::Arc;
use stress_test::{stress_test_replay, stress_test_scaling};
use tracery_sdk::logging::{self, Profile};
use tracery_sdk::prelude::*;
use tracery_sdk::MemoryDispatcher;


const INFO: Property<String> = Property::new("Info");

fn registry() -> Result<TypeRegistry, SdkError> {
    Ok(TypeRegistry::builder()
        .complex("TestResource", |t| {
            t.resource("test-resources")
                .id("Id")
                .property("Id", "Int32")
                .property("Info", "String")
                .property("Spouse", "TestResource")
                .property("Children", "ChildList")
        })
        .complex("Child", |t| {
            t.resource("children")
                .id("Id")
                .property("Id", "Int32")
                .property("Info", "String")
        })
        .collection("ChildList", "Child")
        .build()?)
}

fn original() -> (ObjectGraph, NodeId) {
    let mut graph = ObjectGraph::new();
    let childbar = graph.insert_object("Child", vec![("Id", 1.into()), ("Info", "Childbar".into())]);
    let doomed = graph.insert_object(
        "Child",
        vec![("Id", 2.into()), ("Info", "ChildToRemove".into())],
    );
    let children = graph.insert_collection("ChildList", vec![childbar.into(), doomed.into()]);
    let spouse = graph.insert_object("TestResource", vec![("Id", 2.into()), ("Info", "Jalla".into())]);
    let root = graph.insert_object(
        "TestResource",
        vec![
            ("Id", 1.into()),
            ("Info", "Hei".into()),
            ("Spouse", spouse.into()),
            ("Children", children.into()),
        ],
    );
    (graph, root)
}

fn print_request(client: &Client<MemoryDispatcher>) {
    if let Some(request) = client.dispatcher().last() {
        println!("  {} {}", request.method, request.uri);
        println!("  {}", request.body);
    }
}

fn main() -> Result<(), SdkError> {
    logging::init(Profile::Development);

    let client = Client::new_with_memory_dispatcher(Arc::new(registry()?), ClientConfig::default());
    let session = client.create_session("demo");

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            REPLACING A COMPLEX PROPERTY                    ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let (graph, root) = original();
    let resource = session.track(graph, root)?;
    client.patch_tracked(&resource, |form| {
        form.replace_with_new("Spouse", vec![("Info", "BetterWife".into())])?;
        Ok(())
    })?;
    print_request(&client);
    session.release(&resource.uri);

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            EDITING A COLLECTION                            ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let (graph, root) = original();
    let resource = session.track(graph, root)?;
    client.patch_tracked(&resource, |form| {
        let Some(mut children) = form.collection("Children")? else {
            return Ok(());
        };
        children.object_at(0)?.set(&INFO, "Modified child".to_string())?;
        if let Some(doomed) = children.find("Info", "ChildToRemove")? {
            children.remove_at(doomed)?;
        }
        children.push_new(vec![("Info", "Version2".into())])?;
        Ok(())
    })?;
    print_request(&client);

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            REPLAY STRESS TESTS                             ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let stats = stress_test_replay(4, 50, 20)?;
    stats.print();

    let stats = stress_test_replay(10, 200, 50)?;
    stats.print();

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS                                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    stress_test_scaling(20, 5)?;

    println!("\n✓ All runs completed successfully!");
    Ok(())
}
