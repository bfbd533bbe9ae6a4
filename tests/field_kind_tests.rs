use thingdb::{FieldDefinition, FieldKind, Schema, Stores, Thing, Value};

#[tokio::test]
async fn test_reasonable_literals_massage_into_valid_values() {
    let stores = Stores::in_memory();
    let person = Schema::new("Person").unwrap();
    stores.schemas.save(&person).await.unwrap();
    let alice = stores.things.create("Alice", &[person.id()]).await.unwrap();

    let cases: Vec<(FieldKind, String)> = vec![
        (FieldKind::text(), "hello".to_string()),
        (FieldKind::Integer, "42".to_string()),
        (FieldKind::Number, "3.5".to_string()),
        (FieldKind::Boolean, "TRUE".to_string()),
        (FieldKind::Email, "Ann Example <ann@example.com>".to_string()),
        (FieldKind::uri(), "https://example.com/a?b=c".to_string()),
        (FieldKind::Date, "January 26, 2024".to_string()),
        (FieldKind::MonthDay, "Feb 29".to_string()),
        (FieldKind::increment(), "7".to_string()),
        (
            FieldKind::enumeration(["red", "green"]),
            "Green".to_string(),
        ),
        (FieldKind::array(), "[a, b, c]".to_string()),
        (FieldKind::array_of(FieldKind::Integer), "1, 2, 3".to_string()),
        (FieldKind::reference(person.id()), alice.id().to_string()),
        (FieldKind::SchemaRef, person.id().to_string()),
        (FieldKind::calculated("1 + 1"), "anything".to_string()),
    ];

    for (kind, literal) in cases {
        let field = FieldDefinition::new("Field", kind);
        let massaged = field
            .massage(&Value::from(literal.as_str()))
            .unwrap_or_else(|e| panic!("{}: {}", literal, e));
        assert!(
            field.validate(&massaged, &stores).await,
            "{} massaged to invalid {:?}",
            literal,
            massaged
        );
    }
}

#[test]
fn test_unreadable_literals_are_reported() {
    let cases = [
        (FieldKind::Integer, "forty"),
        (FieldKind::Date, "someday"),
        (FieldKind::MonthDay, "Feb 30"),
        (FieldKind::MonthDay, "Jan 9223372036854775807"),
        (FieldKind::increment(), "-1"),
        (FieldKind::enumeration(["red", "green"]), "blue"),
    ];
    for (kind, literal) in cases {
        let field = FieldDefinition::new("Field", kind);
        let error = field.massage(&Value::from(literal)).unwrap_err();
        assert_eq!(error.input, literal);
        assert_eq!(error.field, "Field");
    }
}

#[test]
fn test_empty_input_respects_required() {
    let optional = FieldDefinition::new("Age", FieldKind::Integer);
    let required = FieldDefinition::new("Age", FieldKind::Integer).required();
    assert_eq!(optional.massage(&Value::from("  ")).unwrap(), Value::Null);
    assert!(optional.check(&Value::Null));
    assert!(!required.check(&Value::Null));
}

#[test]
fn test_enum_membership_is_strict_for_uniform_sets() {
    let numeric = FieldKind::enumeration([1, 2, 3]);
    assert!(numeric.check(&Value::Integer(2)));
    assert!(!numeric.check(&Value::from("2")));

    let mixed = FieldKind::Enum {
        values: vec![Value::Integer(1), Value::from("two")],
    };
    assert!(mixed.check(&Value::from("1")));
    assert!(mixed.check(&Value::from("two")));
    assert!(!mixed.check(&Value::from("three")));
}

#[tokio::test]
async fn test_reference_requires_target_in_declared_schema() {
    let stores = Stores::in_memory();
    let person = Schema::new("Person").unwrap();
    let pet = Schema::new("Pet").unwrap();
    stores.schemas.save(&person).await.unwrap();
    stores.schemas.save(&pet).await.unwrap();
    let rex = stores.things.create("Rex", &[pet.id()]).await.unwrap();
    let unsaved = Thing::new("Ghost").unwrap();

    let owner = FieldDefinition::new("Owner", FieldKind::reference(person.id()));
    let wrong_schema = Value::from(rex.id().to_string());
    let missing = Value::from(unsaved.id().to_string());
    assert!(owner.check(&wrong_schema));
    assert!(!owner.validate(&wrong_schema, &stores).await);
    assert!(!owner.validate(&missing, &stores).await);
    assert!(!owner.validate(&Value::from("Rex"), &stores).await);
}

#[test]
fn test_descriptions() {
    let field = FieldDefinition::new("Tags", FieldKind::array_of(FieldKind::text())).required();
    assert!(field.describe(true).ends_with(", required"));
    assert!(!field.describe(false).contains("required"));
    assert_eq!(FieldKind::Email.to_string(), FieldKind::Email.describe(false));
}
