//! Eager loading against SQLite: query bounds, nesting and pivots.

mod common;

use common::{id_of, title_of, Blog};
use metaorm_core::proto::{EntityQuery, FilterExpr, OrderSpec, Raw, RelationInclude, Value};
use metaorm_core::{
    Backend, CountingBackend, EagerLoadPlanner, Error, FanoutBudget, MetaBridge, QueryExecutor, Related,
};

/// `posts` posts, each with one author and `per_post` approved comments by
/// distinct users plus one unapproved comment.
fn seed(blog: &Blog, posts: usize, per_post: usize) {
    for p in 0..posts {
        let author = blog.user(&format!("author{}", p));
        let post = blog.post(&format!("post{}", p), &author);
        for c in 0..per_post {
            let user = blog.user(&format!("reader{}-{}", p, c));
            blog.comment(&post, &user, &format!("comment {}", c), true);
        }
        blog.comment(&post, &author, "spam", false);
    }
}

fn nested_query() -> EntityQuery {
    EntityQuery::new("Post")
        .include(RelationInclude::new("author"))
        .include(RelationInclude::new("comments"))
        .include(RelationInclude::new("comments.user"))
        .with_order(OrderSpec::asc("ID"))
}

#[test]
fn test_query_count_is_independent_of_result_size() {
    for posts in [1usize, 4, 25] {
        let blog = Blog::new();
        seed(&blog, posts, 3);

        let counting = CountingBackend::new(&blog.backend);
        let executor = QueryExecutor::new(&blog.catalog, &counting);
        let result = executor.execute(&nested_query()).unwrap();

        assert_eq!(result.len(), posts);
        assert_eq!(counting.count(), 4, "statements: {:?}", counting.statements());
    }
}

#[test]
fn test_nested_relations_are_attached() {
    let blog = Blog::new();
    seed(&blog, 3, 2);

    let executor = QueryExecutor::new(&blog.catalog, &blog.backend);
    let result = executor.execute(&nested_query()).unwrap();

    for (i, post) in result.iter().enumerate() {
        let author = post.related_one("author").unwrap();
        assert_eq!(
            author.get("user_login").unwrap(),
            Some(Value::String(format!("author{}", i)))
        );

        let comments = post.related_many("comments");
        assert_eq!(comments.len(), 2);
        for (c, comment) in comments.iter().enumerate() {
            assert_eq!(
                comment.get("comment_post_ID").unwrap(),
                Some(Value::Int(id_of(post)))
            );
            let user = comment.related_one("user").unwrap();
            assert_eq!(
                user.get("user_login").unwrap(),
                Some(Value::String(format!("reader{}-{}", i, c)))
            );
        }
    }
}

#[test]
fn test_empty_relations_are_marked_loaded() {
    let blog = Blog::new();
    let author = blog.user("alice");
    blog.post("lonely", &author);
    blog.backend
        .execute("UPDATE posts SET post_author = 999", &[])
        .unwrap();

    let executor = QueryExecutor::new(&blog.catalog, &blog.backend);
    let result = executor
        .execute(
            &EntityQuery::new("Post")
                .include(RelationInclude::new("author"))
                .include(RelationInclude::new("comments")),
        )
        .unwrap();

    let post = result.first().unwrap();
    assert!(post.is_loaded("author"));
    assert_eq!(post.relation("author"), Some(&Related::One(None)));
    assert!(post.is_loaded("comments"));
    assert!(post.related_many("comments").is_empty());
    assert!(!post.is_loaded("terms"));
}

#[test]
fn test_include_filter_composes_with_relation_constraint() {
    let blog = Blog::new();
    let author = blog.user("alice");
    let post = blog.post("p", &author);
    blog.comment(&post, &author, "great post", true);
    blog.comment(&post, &author, "meh", true);
    blog.comment(&post, &author, "great spam", false);

    let executor = QueryExecutor::new(&blog.catalog, &blog.backend);
    let query = EntityQuery::new("Post").include(
        RelationInclude::new("comments")
            .with_filter(FilterExpr::like("comment_content", "great%")),
    );
    let result = executor.execute(&query).unwrap();

    let comments = result.first().unwrap().related_many("comments");
    assert_eq!(comments.len(), 1);
    assert_eq!(
        comments[0].get("comment_content").unwrap(),
        Some(Value::String("great post".into()))
    );
}

#[test]
fn test_many_to_many_through_pivot() {
    let blog = Blog::new();
    let author = blog.user("alice");
    let first = blog.post("first", &author);
    let second = blog.post("second", &author);
    blog.post("third", &author);

    let mut term_ids = Vec::new();
    for name in ["news", "rust", "sqlite"] {
        let mut term = blog.entity("Term");
        term.set("name", name).unwrap();
        term.save(&blog.backend).unwrap();
        term_ids.push(id_of(&term));
    }
    for (post, term) in [(&first, 0), (&first, 2), (&second, 1), (&second, 2)] {
        blog.backend
            .execute(
                "INSERT INTO term_relationships (object_id, term_taxonomy_id) VALUES (?, ?)",
                &[Raw::Integer(id_of(post)), Raw::Integer(term_ids[term])],
            )
            .unwrap();
    }

    let counting = CountingBackend::new(&blog.backend);
    let executor = QueryExecutor::new(&blog.catalog, &counting);
    let result = executor
        .execute(
            &EntityQuery::new("Post")
                .include(RelationInclude::new("terms"))
                .with_order(OrderSpec::asc("ID")),
        )
        .unwrap();
    assert_eq!(counting.count(), 2);

    let names: Vec<Vec<String>> = result
        .iter()
        .map(|post| {
            post.related_many("terms")
                .iter()
                .filter_map(|t| t.get("name").unwrap().and_then(|v| v.as_str().map(String::from)))
                .collect()
        })
        .collect();
    assert_eq!(
        names,
        vec![
            vec!["news".to_string(), "sqlite".to_string()],
            vec!["rust".to_string(), "sqlite".to_string()],
            vec![],
        ]
    );
    // The pivot owner column is not part of the related entity.
    assert!(result.first().unwrap().related_many("terms")[0].raw("__owner").is_none());
}

#[test]
fn test_meta_include_preloads_nested_entities() {
    let blog = Blog::new();
    let author = blog.user("alice");
    let mut post = blog.post("p", &author);
    blog.set_meta(&mut post, "price", 30i64);
    for rating in [4i64, 5] {
        let comment = blog.comment(&post, &author, "ok", true);
        blog.backend
            .execute(
                "INSERT INTO commentmeta (comment_id, meta_key, meta_value) VALUES (?, 'rating', ?)",
                &[Raw::Integer(id_of(&comment)), Raw::Text(rating.to_string())],
            )
            .unwrap();
    }

    let counting = CountingBackend::new(&blog.backend);
    let executor = QueryExecutor::new(&blog.catalog, &counting);
    let query = EntityQuery::new("Post")
        .include(RelationInclude::new("meta").with_meta_keys(["price"]))
        .include(RelationInclude::new("comments.meta"));
    let result = executor.execute(&query).unwrap();
    // root, post meta, comments, comment meta
    assert_eq!(counting.count(), 4);

    counting.reset();
    let bridge = MetaBridge::new(&counting);
    let post = result.first().unwrap();
    assert_eq!(bridge.get_meta_value(post, "price").unwrap(), Some(Value::Int(30)));
    let ratings: Vec<Option<Value>> = post
        .related_many("comments")
        .iter()
        .map(|c| bridge.get_meta_value(c, "rating").unwrap())
        .collect();
    assert_eq!(ratings, vec![Some(Value::Int(4)), Some(Value::Int(5))]);
    assert_eq!(counting.count(), 0);
}

#[test]
fn test_planner_loads_into_existing_entities() {
    let blog = Blog::new();
    seed(&blog, 2, 1);

    let mut posts = QueryExecutor::new(&blog.catalog, &blog.backend)
        .execute(&EntityQuery::new("Post").with_order(OrderSpec::asc("ID")))
        .unwrap()
        .into_entities();

    let counting = CountingBackend::new(&blog.backend);
    let planner = EagerLoadPlanner::new(&blog.catalog, &counting);
    let model = blog.catalog.model("Post").unwrap();
    let plan = planner
        .plan(&model, &[RelationInclude::new("comments.user")])
        .unwrap();
    assert_eq!(plan.query_count(), 2);

    planner.load(&mut posts, &plan).unwrap();
    assert_eq!(counting.count(), 2);
    assert_eq!(title_of(&posts[1]), "post1");
    assert_eq!(posts[1].related_many("comments").len(), 1);
    assert!(posts[1].related_many("comments")[0].related_one("user").is_some());
}

#[test]
fn test_unknown_relation_issues_no_query() {
    let blog = Blog::new();
    let counting = CountingBackend::new(&blog.backend);
    let executor = QueryExecutor::new(&blog.catalog, &counting);

    let query = EntityQuery::new("Post").include(RelationInclude::new("comments.editor"));
    assert!(matches!(
        executor.execute(&query),
        Err(Error::UnknownRelation { entity, relation }) if entity == "Comment" && relation == "editor"
    ));
    assert_eq!(counting.count(), 0);
}

#[test]
fn test_depth_budget() {
    let blog = Blog::new();
    let counting = CountingBackend::new(&blog.backend);
    let executor =
        QueryExecutor::new(&blog.catalog, &counting).with_budget(FanoutBudget::new(100, 1));

    let query = EntityQuery::new("Post").include(RelationInclude::new("comments.user"));
    assert!(matches!(executor.execute(&query), Err(Error::BudgetExceeded(_))));
    assert_eq!(counting.count(), 0);
}
