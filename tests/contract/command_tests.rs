//! Command surface tests.
//!
//! These tests run the Redis-style commands through a [`Client`] and check
//! the observable results. Keys are prefixed `contract_` and every test uses
//! its own keys, so a backend only needs to be created once.

use std::collections::HashMap;

use dynaredis::{Aggregate, Client, Error, Flags, Location, RangeCap, ScoredMember, Unit, Value};

fn values(items: &[&str]) -> Vec<Value> {
    items.iter().map(|s| Value::from(*s)).collect()
}

fn members(scored: &[ScoredMember]) -> Vec<&str> {
    scored.iter().map(|m| m.member.as_str()).collect()
}

// =============================================================================
// Keys
// =============================================================================

pub async fn test_del_and_exists(client: &Client) {
    client.rpush("contract_del_list", ["a", "b"]).await.unwrap();
    client.sadd("contract_del_set", ["x"]).await.unwrap();

    assert_eq!(
        client
            .exists(&["contract_del_list", "contract_del_set", "contract_del_none"])
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        client
            .del(&["contract_del_list", "contract_del_set", "contract_del_none"])
            .await
            .unwrap(),
        2
    );
    assert_eq!(client.exists(&["contract_del_list"]).await.unwrap(), 0);

    // Indices keep growing after the list is recreated.
    client.rpush("contract_del_list", ["c"]).await.unwrap();
    assert_eq!(
        client.lrange("contract_del_list", 0, -1).await.unwrap(),
        values(&["c"])
    );
}

pub async fn test_reserved_keys_rejected(client: &Client) {
    let err = client.rpush("_dynaredis/x", ["a"]).await.unwrap_err();
    assert!(matches!(err, Error::ReservedKey(_)), "got {err:?}");
    assert!(client.hget("", "f").await.is_err());
}

// =============================================================================
// Lists
// =============================================================================

pub async fn test_list_push_pop(client: &Client) {
    let key = "contract_list_push_pop";
    assert_eq!(client.rpush(key, ["b", "c"]).await.unwrap(), 2);
    assert_eq!(client.lpush(key, ["a"]).await.unwrap(), 3);
    assert_eq!(client.rpush(key, [1_i64, 2]).await.unwrap(), 5);
    assert_eq!(
        client.lrange(key, 0, -1).await.unwrap(),
        vec![
            Value::from("a"),
            Value::from("b"),
            Value::from("c"),
            Value::Integer(1),
            Value::Integer(2)
        ]
    );
    assert_eq!(client.lindex(key, -2).await.unwrap(), Some(Value::Integer(1)));
    assert_eq!(client.lindex(key, 9).await.unwrap(), None);

    assert_eq!(client.lpop(key).await.unwrap(), Some(Value::from("a")));
    assert_eq!(client.rpop(key).await.unwrap(), Some(Value::Integer(2)));
    assert_eq!(client.llen(key).await.unwrap(), 3);
    assert_eq!(client.lpop("contract_list_none").await.unwrap(), None);
}

pub async fn test_list_pushx(client: &Client) {
    let key = "contract_list_pushx";
    assert_eq!(client.rpushx(key, ["a"]).await.unwrap(), 0);
    assert_eq!(client.llen(key).await.unwrap(), 0);
    client.rpush(key, ["b"]).await.unwrap();
    assert_eq!(client.lpushx(key, ["a"]).await.unwrap(), 2);
    assert_eq!(client.rpushx(key, ["c"]).await.unwrap(), 3);
    assert_eq!(client.lrange(key, 0, -1).await.unwrap(), values(&["a", "b", "c"]));
}

pub async fn test_list_duplicates(client: &Client) {
    let key = "contract_list_duplicates";
    client
        .rpush(key, ["x", "y", "x", "z", "x"])
        .await
        .unwrap();
    assert_eq!(client.llen(key).await.unwrap(), 5);

    assert_eq!(client.lrem(key, 1, "x").await.unwrap(), (4, true));
    assert_eq!(
        client.lrange(key, 0, -1).await.unwrap(),
        values(&["y", "x", "z", "x"])
    );
    assert_eq!(client.lrem(key, -1, "x").await.unwrap(), (3, true));
    assert_eq!(client.lrange(key, 0, -1).await.unwrap(), values(&["y", "x", "z"]));
    assert_eq!(client.lrem(key, 0, "nope").await.unwrap(), (3, false));
}

pub async fn test_list_lset_ltrim(client: &Client) {
    let key = "contract_list_lset_ltrim";
    client.rpush(key, ["a", "b", "c", "d", "e"]).await.unwrap();

    assert!(client.lset(key, 1, "B").await.unwrap());
    assert!(client.lset(key, -1, "E").await.unwrap());
    assert!(!client.lset(key, 5, "out").await.unwrap());
    assert_eq!(
        client.lrange(key, 0, -1).await.unwrap(),
        values(&["a", "B", "c", "d", "E"])
    );

    assert_eq!(client.ltrim(key, 1, -2).await.unwrap(), 3);
    assert_eq!(client.lrange(key, 0, -1).await.unwrap(), values(&["B", "c", "d"]));

    assert_eq!(client.ltrim(key, 5, 10).await.unwrap(), 0);
    assert_eq!(client.exists(&[key]).await.unwrap(), 0);
}

pub async fn test_list_rpoplpush(client: &Client) {
    let source = "contract_list_rpoplpush_src";
    let destination = "contract_list_rpoplpush_dst";
    client.rpush(source, ["a", "b"]).await.unwrap();

    assert_eq!(
        client.rpoplpush(source, destination).await.unwrap(),
        Some(Value::from("b"))
    );
    assert_eq!(client.lrange(source, 0, -1).await.unwrap(), values(&["a"]));
    assert_eq!(client.lrange(destination, 0, -1).await.unwrap(), values(&["b"]));
    assert_eq!(
        client
            .rpoplpush("contract_list_rpoplpush_none", destination)
            .await
            .unwrap(),
        None
    );
}

// =============================================================================
// Sorted sets
// =============================================================================

pub async fn test_zadd_flags(client: &Client) {
    let key = "contract_zset_flags";
    assert_eq!(
        client
            .zadd(key, [("a", 1.0), ("b", 2.0)], Flags::Always)
            .await
            .unwrap(),
        ["a", "b"]
    );
    assert!(client
        .zadd(key, [("a", 5.0)], Flags::IfNotExists)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(client.zscore(key, "a").await.unwrap(), Some(1.0));

    assert!(client
        .zadd(key, [("c", 3.0)], Flags::IfAlreadyExists)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(client.zscore(key, "c").await.unwrap(), None);

    client
        .zadd(key, [("a", 4.0)], Flags::IfAlreadyExists)
        .await
        .unwrap();
    assert_eq!(client.zscore(key, "a").await.unwrap(), Some(4.0));
    assert_eq!(client.zcard(key).await.unwrap(), 2);
}

pub async fn test_zset_ranges(client: &Client) {
    let key = "contract_zset_ranges";
    client
        .zadd(
            key,
            [("d", 4.0), ("a", 1.0), ("c", 3.0), ("b", 2.0), ("e", 5.0)],
            Flags::Always,
        )
        .await
        .unwrap();

    assert_eq!(members(&client.zrange(key, 0, -1).await.unwrap()), ["a", "b", "c", "d", "e"]);
    assert_eq!(members(&client.zrevrange(key, 0, 1).await.unwrap()), ["e", "d"]);
    assert_eq!(
        client.zrange(key, -2, -1).await.unwrap(),
        vec![ScoredMember::new("d", 4.0), ScoredMember::new("e", 5.0)]
    );

    assert_eq!(
        members(&client.zrangebyscore(key, 2.0, 4.0, 0, 0).await.unwrap()),
        ["b", "c", "d"]
    );
    assert_eq!(
        members(&client.zrangebyscore(key, 2.0, 5.0, 1, 2).await.unwrap()),
        ["c", "d"]
    );
    assert_eq!(
        members(&client.zrevrangebyscore(key, 4.0, 1.0, 0, 2).await.unwrap()),
        ["d", "c"]
    );
    assert_eq!(
        members(
            &client
                .zrangebyscore(key, f64::NEG_INFINITY, f64::INFINITY, 0, 0)
                .await
                .unwrap()
        ),
        ["a", "b", "c", "d", "e"]
    );
    assert_eq!(client.zcount(key, 1.5, 3.0).await.unwrap(), 2);
    assert_eq!(client.zcount(key, 3.0, 1.0).await.unwrap(), 0);
}

pub async fn test_zset_lex(client: &Client) {
    let key = "contract_zset_lex";
    client
        .zadd(
            key,
            [("apple", 0.0), ("banana", 0.0), ("cherry", 0.0), ("date", 0.0)],
            Flags::Always,
        )
        .await
        .unwrap();

    assert_eq!(
        members(
            &client
                .zrangebylex(key, RangeCap::lex("b"), RangeCap::lex("d"), 0, 0)
                .await
                .unwrap()
        ),
        ["banana", "cherry"]
    );
    assert_eq!(
        members(
            &client
                .zrevrangebylex(key, RangeCap::Unbounded, RangeCap::lex("b"), 0, 2)
                .await
                .unwrap()
        ),
        ["date", "cherry"]
    );
    assert_eq!(
        client
            .zlexcount(key, RangeCap::Unbounded, RangeCap::Unbounded)
            .await
            .unwrap(),
        4
    );
    assert_eq!(
        client
            .zremrangebylex(key, RangeCap::lex("c"), RangeCap::Unbounded)
            .await
            .unwrap(),
        ["cherry", "date"]
    );
    assert_eq!(client.zcard(key).await.unwrap(), 2);
}

pub async fn test_zset_rank_and_ties(client: &Client) {
    let key = "contract_zset_rank";
    client
        .zadd(
            key,
            [("x", 1.0), ("b", 2.0), ("a", 2.0), ("z", 3.0)],
            Flags::Always,
        )
        .await
        .unwrap();

    assert_eq!(client.zrank(key, "x").await.unwrap(), Some(0));
    assert_eq!(client.zrank(key, "a").await.unwrap(), Some(1));
    assert_eq!(client.zrank(key, "b").await.unwrap(), Some(2));
    assert_eq!(client.zrevrank(key, "z").await.unwrap(), Some(0));
    assert_eq!(client.zrevrank(key, "b").await.unwrap(), Some(1));
    assert_eq!(client.zrevrank(key, "x").await.unwrap(), Some(3));
    assert_eq!(client.zrank(key, "nope").await.unwrap(), None);
}

pub async fn test_zset_incr_pop_remove(client: &Client) {
    let key = "contract_zset_incr_pop";
    assert_eq!(client.zincrby(key, "a", 2.5).await.unwrap(), 2.5);
    assert_eq!(client.zincrby(key, "a", -1.0).await.unwrap(), 1.5);
    client
        .zadd(key, [("b", 0.5), ("c", 9.0), ("d", 4.0)], Flags::Always)
        .await
        .unwrap();

    assert_eq!(client.zpopmin(key, 1).await.unwrap(), vec![ScoredMember::new("b", 0.5)]);
    assert_eq!(members(&client.zpopmax(key, 2).await.unwrap()), ["c", "d"]);
    assert_eq!(client.zcard(key).await.unwrap(), 1);

    client
        .zadd(key, [("e", 5.0), ("f", 6.0), ("g", 7.0)], Flags::Always)
        .await
        .unwrap();
    assert_eq!(client.zremrangebyrank(key, 0, 1).await.unwrap(), ["a", "e"]);
    assert_eq!(client.zremrangebyscore(key, 7.0, 100.0).await.unwrap(), ["g"]);
    assert_eq!(client.zrem(key, ["f", "missing"]).await.unwrap(), ["f"]);
    assert_eq!(client.zcard(key).await.unwrap(), 0);
}

pub async fn test_zset_union_inter(client: &Client) {
    let (a, b) = ("contract_zset_alg_a", "contract_zset_alg_b");
    client
        .zadd(a, [("one", 1.0), ("two", 2.0)], Flags::Always)
        .await
        .unwrap();
    client
        .zadd(b, [("two", 10.0), ("three", 3.0)], Flags::Always)
        .await
        .unwrap();

    assert_eq!(
        client.zunion(&[a, b], Aggregate::Sum, None).await.unwrap(),
        vec![
            ScoredMember::new("one", 1.0),
            ScoredMember::new("three", 3.0),
            ScoredMember::new("two", 12.0),
        ]
    );

    let weights = HashMap::from([(b.to_string(), 0.5)]);
    assert_eq!(
        client
            .zinter(&[a, b], Aggregate::Max, Some(&weights))
            .await
            .unwrap(),
        vec![ScoredMember::new("two", 5.0)]
    );

    let stored = client
        .zunionstore("contract_zset_alg_dst", &[a, b], Aggregate::Min, None)
        .await
        .unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(
        client.zscore("contract_zset_alg_dst", "two").await.unwrap(),
        Some(2.0)
    );

    let inter = client
        .zinterstore("contract_zset_alg_inter", &[a, b], Aggregate::Sum, None)
        .await
        .unwrap();
    assert_eq!(inter, vec![ScoredMember::new("two", 12.0)]);
    assert_eq!(client.zcard("contract_zset_alg_inter").await.unwrap(), 1);
}

// =============================================================================
// Sets
// =============================================================================

pub async fn test_sets(client: &Client) {
    let (a, b) = ("contract_set_a", "contract_set_b");
    assert_eq!(client.sadd(a, ["1", "2", "3"]).await.unwrap(), ["1", "2", "3"]);
    assert_eq!(client.sadd(a, ["3", "4"]).await.unwrap(), ["4"]);
    client.sadd(b, ["3", "4", "5"]).await.unwrap();

    assert_eq!(client.scard(a).await.unwrap(), 4);
    assert!(client.sismember(a, "2").await.unwrap());
    assert_eq!(client.sinter(&[a, b]).await.unwrap(), ["3", "4"]);
    assert_eq!(client.sdiff(a, &[b]).await.unwrap(), ["1", "2"]);
    assert_eq!(client.sunion(&[a, b]).await.unwrap(), ["1", "2", "3", "4", "5"]);

    assert!(client.smove(a, b, "1").await.unwrap());
    assert!(!client.smove(a, b, "1").await.unwrap());
    assert_eq!(client.smembers(b).await.unwrap(), ["1", "3", "4", "5"]);

    let picked = client.srandmember(b, 2).await.unwrap();
    assert_eq!(picked.len(), 2);
    assert_ne!(picked[0], picked[1]);

    let popped = client.spop(b, 10).await.unwrap();
    assert_eq!(popped.len(), 4);
    assert_eq!(client.scard(b).await.unwrap(), 0);
}

// =============================================================================
// Hashes
// =============================================================================

pub async fn test_hashes(client: &Client) {
    let key = "contract_hash";
    assert_eq!(
        client.hset(key, [("a", "1"), ("b", "2")]).await.unwrap(),
        ["a", "b"]
    );
    client
        .hmset(key, [("c", Value::Integer(3)), ("b", Value::from("two"))])
        .await
        .unwrap();

    assert_eq!(
        client.hmget(key, &["b", "zz", "c"]).await.unwrap(),
        vec![Some(Value::from("two")), None, Some(Value::Integer(3))]
    );
    assert_eq!(client.hkeys(key).await.unwrap(), ["a", "b", "c"]);
    assert_eq!(client.hlen(key).await.unwrap(), 3);

    assert_eq!(client.hincrby(key, "c", 4).await.unwrap(), 7);
    assert_eq!(client.hincrbyfloat(key, "f", 0.25).await.unwrap(), 0.25);
    assert_eq!(client.hincrbyfloat(key, "c", 0.5).await.unwrap(), 7.5);
    assert_eq!(client.hincrbyfloat(key, "c", -0.5).await.unwrap(), 7.0);
    assert_eq!(client.hincrby(key, "c", 0).await.unwrap(), 7);
    assert!(!client.hsetnx(key, "a", "x").await.unwrap());
    assert!(client.hexists(key, "f").await.unwrap());

    assert_eq!(client.hdel(key, ["a", "f", "nope"]).await.unwrap(), ["a", "f"]);
    let all = client.hgetall(key).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all["c"], Value::Integer(7));
}

// =============================================================================
// Geo
// =============================================================================

pub async fn test_geo(client: &Client) {
    let key = "contract_geo";
    let added = client
        .geoadd(
            key,
            [
                ("Palermo", Location::new(38.115_556, 13.361_389)),
                ("Catania", Location::new(37.502_669, 15.087_269)),
            ],
        )
        .await
        .unwrap();
    assert_eq!(added, ["Palermo", "Catania"]);

    let km = client
        .geodist(key, "Palermo", "Catania", Unit::Kilometers)
        .await
        .unwrap()
        .unwrap();
    assert!((km - 166.274).abs() < 0.01, "{km}");

    let mut near: Vec<String> = client
        .georadius(key, Location::new(37.0, 15.0), 200.0, Unit::Kilometers, None)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.member)
        .collect();
    near.sort();
    assert_eq!(near, ["Catania", "Palermo"]);

    let around = client
        .georadiusbymember(key, "Catania", 50.0, Unit::Kilometers, None)
        .await
        .unwrap();
    assert_eq!(around.len(), 1);
    assert_eq!(around[0].member, "Catania");

    assert_eq!(
        client.geohash(key, &["Palermo"]).await.unwrap(),
        vec![Some("sqc8b49rny0".to_string())]
    );
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all command tests against a client.
#[macro_export]
macro_rules! run_command_tests {
    ($client:expr) => {
        use $crate::contract::command_tests::*;

        // keys
        test_del_and_exists($client).await;
        println!("  test_del_and_exists: PASSED");

        test_reserved_keys_rejected($client).await;
        println!("  test_reserved_keys_rejected: PASSED");

        // lists
        test_list_push_pop($client).await;
        println!("  test_list_push_pop: PASSED");

        test_list_pushx($client).await;
        println!("  test_list_pushx: PASSED");

        test_list_duplicates($client).await;
        println!("  test_list_duplicates: PASSED");

        test_list_lset_ltrim($client).await;
        println!("  test_list_lset_ltrim: PASSED");

        test_list_rpoplpush($client).await;
        println!("  test_list_rpoplpush: PASSED");

        // sorted sets
        test_zadd_flags($client).await;
        println!("  test_zadd_flags: PASSED");

        test_zset_ranges($client).await;
        println!("  test_zset_ranges: PASSED");

        test_zset_lex($client).await;
        println!("  test_zset_lex: PASSED");

        test_zset_rank_and_ties($client).await;
        println!("  test_zset_rank_and_ties: PASSED");

        test_zset_incr_pop_remove($client).await;
        println!("  test_zset_incr_pop_remove: PASSED");

        test_zset_union_inter($client).await;
        println!("  test_zset_union_inter: PASSED");

        // sets
        test_sets($client).await;
        println!("  test_sets: PASSED");

        // hashes
        test_hashes($client).await;
        println!("  test_hashes: PASSED");

        // geo
        test_geo($client).await;
        println!("  test_geo: PASSED");
    };
}
