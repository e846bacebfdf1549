//! End-to-end tests of the reservation core over the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{
    AuthorProfile, Counterparty, DiscountPercent, ErrorKind, Money, OrderLike, OrderStatus,
    PriceList, PriceTier, PricingProfile, Product, ReasonCode, StockOrderStatus,
};
use inventory::{
    CheckoutRequest, Collaborators, InMemoryNotifier, InMemoryStockService,
    InMemoryUserDirectory, Inventory, InventorySettings, ItemQuantity, NotificationKind, Page,
    StockOrderUpdate, StockServiceError,
};
use inventory_store::{InMemoryInventoryStore, InventoryStore};

struct TestHarness {
    inventory: Inventory<InMemoryInventoryStore>,
    store: InMemoryInventoryStore,
    users: InMemoryUserDirectory,
    upstream: InMemoryStockService,
    notifier: InMemoryNotifier,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryInventoryStore::new();
        let users = InMemoryUserDirectory::new();
        let upstream = InMemoryStockService::new();
        let notifier = InMemoryNotifier::new();

        let inventory = Inventory::new(
            store.clone(),
            Collaborators::new(
                Arc::new(users.clone()),
                Arc::new(upstream.clone()),
                Arc::new(notifier.clone()),
            ),
            InventorySettings {
                customer_counterparty_id: "retail-buyer".to_string(),
                ..Default::default()
            },
        );

        Self {
            inventory,
            store,
            users,
            upstream,
            notifier,
        }
    }

    async fn author(&self) -> UserId {
        let id = UserId::new();
        self.users.insert(AuthorProfile::active(id, "Ann")).await;
        id
    }

    async fn product(&self, count: u32) -> ProductId {
        let product = Product::new(
            format!("SKU-{count}"),
            "Widget",
            count,
            PriceList {
                retail: Money::from_cents(1000),
                wholesale: Money::from_cents(800),
                distributor: Money::from_cents(600),
            },
        );
        let id = product.id;
        self.store.save_product(product).await.unwrap();
        id
    }

    async fn available(&self, product: ProductId) -> u32 {
        self.inventory
            .quantities()
            .get_product_quantity_details(product)
            .await
            .unwrap()
            .available_quantity
    }
}

#[tokio::test]
async fn test_happy_path_quantities() {
    let h = TestHarness::new();
    let author = h.author().await;
    let product = h.product(10).await;
    let orders = h.inventory.orders();

    let view = orders.create_or_add(author, product, 4).await.unwrap();
    let order = view.order.id();
    assert_eq!(h.available(product).await, 6);

    orders.update_cart_item(author, product, 7).await.unwrap();
    assert_eq!(h.available(product).await, 3);

    orders
        .to_order(author, CheckoutRequest::default())
        .await
        .unwrap();
    assert_eq!(h.available(product).await, 3);

    orders
        .change_order_status(order, Some(OrderStatus::Rejected))
        .await
        .unwrap();
    assert_eq!(h.available(product).await, 10);
}

#[tokio::test]
async fn test_add_to_cart_accumulates() {
    let h = TestHarness::new();
    let author = h.author().await;
    let product = h.product(10).await;

    h.inventory.orders().create_or_add(author, product, 2).await.unwrap();
    let view = h.inventory.orders().create_or_add(author, product, 3).await.unwrap();

    let item = view.item_for(product).unwrap();
    assert_eq!(item.item.item_count, 5);
    assert_eq!(item.held_quantity, 5);
    assert_eq!(view.order.items().len(), 1);

    let reread = h.inventory.orders().get_order(view.order.id()).await.unwrap();
    assert_eq!(reread, view);
}

#[tokio::test]
async fn test_order_lifecycle_keeps_hold_after_delivery() {
    let h = TestHarness::new();
    let author = h.author().await;
    let product = h.product(10).await;
    let orders = h.inventory.orders();

    let order = orders
        .create_or_add(author, product, 3)
        .await
        .unwrap()
        .order
        .id();
    let ordered = orders
        .to_order(
            author,
            CheckoutRequest {
                packaging: domain::Packaging::Bag,
                necessary_notes: "ring twice".to_string(),
            },
        )
        .await
        .unwrap();
    let customer = ordered.order.as_customer().unwrap();
    assert_eq!(customer.status(), OrderStatus::Ordered);
    assert!(customer.timestamps.confirmed_time.is_some());
    assert!(ordered.items.iter().all(|i| !i.item.in_progress));

    let confirmed = orders
        .change_order_status(order, Some(OrderStatus::Confirmed))
        .await
        .unwrap();
    let customer = confirmed.order.as_customer().unwrap();
    assert_eq!(customer.external_order_id.as_deref(), Some("EXT-0001"));
    assert_eq!(customer.total, Some(Money::from_cents(3000)));
    assert!(customer.timestamps.accepted_time.is_some());
    assert_eq!(confirmed.items[0].item.unit_price, Some(Money::from_cents(1000)));

    let submissions = h.upstream.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].counterparty_id, "retail-buyer");
    assert_eq!(submissions[0].notes, "ring twice");

    let delivered = orders
        .change_order_status(order, Some(OrderStatus::Delivered))
        .await
        .unwrap();
    assert!(delivered.order.as_customer().unwrap().timestamps.delivered_time.is_some());
    assert_eq!(delivered.items[0].held_quantity, 3);
    assert_eq!(h.available(product).await, 7);

    orders
        .change_order_status(order, Some(OrderStatus::Completed))
        .await
        .unwrap();
    assert_eq!(h.available(product).await, 10);

    let sent = h.notifier.sent().await;
    assert_eq!(sent[0].kind, NotificationKind::OrderPlaced);
    assert_eq!(sent.len(), 4);
}

#[tokio::test]
async fn test_same_status_is_a_noop_and_missing_status_rejected() {
    let h = TestHarness::new();
    let author = h.author().await;
    let product = h.product(10).await;
    let orders = h.inventory.orders();
    let order = orders
        .create_or_add(author, product, 1)
        .await
        .unwrap()
        .order
        .id();

    let same = orders
        .change_order_status(order, Some(OrderStatus::InProgress))
        .await
        .unwrap();
    assert!(same.order.is_in_progress());

    let err = orders.change_order_status(order, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.reason(), ReasonCode::StatusRequired);

    let err = orders
        .change_order_status(order, Some(OrderStatus::Delivered))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), ReasonCode::InvalidStatusTransition);
}

#[tokio::test]
async fn test_upstream_failure_leaves_order_unchanged() {
    let h = TestHarness::new();
    let author = h.author().await;
    let product = h.product(10).await;
    let orders = h.inventory.orders();
    let order = orders
        .create_or_add(author, product, 2)
        .await
        .unwrap()
        .order
        .id();
    orders.to_order(author, CheckoutRequest::default()).await.unwrap();

    h.upstream
        .set_failure(Some(StockServiceError::InvalidToken))
        .await;
    let err = orders
        .change_order_status(order, Some(OrderStatus::Confirmed))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.reason(), ReasonCode::InvalidUpstreamToken);

    let view = orders.get_order(order).await.unwrap();
    assert_eq!(view.order.as_customer().unwrap().status(), OrderStatus::Ordered);
    assert_eq!(view.items[0].held_quantity, 2);
}

#[tokio::test]
async fn test_reordering_after_rejection_revalidates_stock() {
    let h = TestHarness::new();
    let first = h.author().await;
    let second = h.author().await;
    let product = h.product(5).await;
    let orders = h.inventory.orders();

    let order = orders
        .create_or_add(first, product, 4)
        .await
        .unwrap()
        .order
        .id();
    orders.to_order(first, CheckoutRequest::default()).await.unwrap();
    orders
        .change_order_status(order, Some(OrderStatus::Rejected))
        .await
        .unwrap();

    orders.create_or_add(second, product, 3).await.unwrap();

    let err = orders
        .change_order_status(order, Some(OrderStatus::Ordered))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), ReasonCode::NotEnoughProductQuantityInStock);
    assert_eq!(h.available(product).await, 2);

    let view = orders.get_order(order).await.unwrap();
    assert_eq!(view.order.as_customer().unwrap().status(), OrderStatus::Rejected);
}

#[tokio::test]
async fn test_single_in_progress_order_per_author() {
    let h = TestHarness::new();
    let author = h.author().await;
    let a = h.product(10).await;
    let b = h.product(10).await;

    let first = h.inventory.orders().create_or_add(author, a, 1).await.unwrap();
    let second = h.inventory.orders().create_or_add(author, b, 1).await.unwrap();
    assert_eq!(first.order.id(), second.order.id());
    assert_eq!(second.order.items().len(), 2);

    h.inventory
        .orders()
        .to_order(author, CheckoutRequest::default())
        .await
        .unwrap();
    let third = h.inventory.orders().create_or_add(author, a, 1).await.unwrap();
    assert_ne!(third.order.id(), first.order.id());

    let err = h
        .inventory
        .orders()
        .create_or_add(author, a, 20)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_holds_never_oversell() {
    let h = TestHarness::new();
    let product = h.product(5).await;
    let a = h.author().await;
    let b = h.author().await;

    let orders_a = h.inventory.orders().clone();
    let orders_b = h.inventory.orders().clone();
    let first = tokio::spawn(async move { orders_a.create_or_add(a, product, 3).await });
    let second = tokio::spawn(async move { orders_b.create_or_add(b, product, 3).await });

    let results = [first.await.unwrap(), second.await.unwrap()];
    let granted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(granted, 1);
    let refused = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(refused.reason(), ReasonCode::NotEnoughProductQuantityInStock);
    assert_eq!(h.available(product).await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cart_adds_keep_items_and_holds_together() {
    let h = TestHarness::new();
    let author = h.author().await;
    let first = h.product(10).await;
    let cart = h
        .inventory
        .orders()
        .create_or_add(author, first, 1)
        .await
        .unwrap()
        .order
        .id();

    let mut products = Vec::new();
    for _ in 0..20 {
        products.push(h.product(10).await);
    }

    let tasks: Vec<_> = products
        .iter()
        .map(|&product| {
            let orders = h.inventory.orders().clone();
            tokio::spawn(async move { orders.create_or_add(author, product, 2).await })
        })
        .collect();
    let mut granted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => granted += 1,
            Err(e) => assert_eq!(e.reason(), ReasonCode::ConcurrencyConflict),
        }
    }

    let view = h.inventory.orders().get_order(cart).await.unwrap();
    assert_eq!(view.order.items().len(), granted + 1);
    for product in products {
        let item = h.store.find_line_item(cart, product).await.unwrap();
        let hold = h.store.find_reservation(product, cart).await.unwrap();
        match item {
            Some(item) => {
                assert!(view.order.items().contains(&item.id));
                assert_eq!(hold.map(|r| r.quantity), Some(2));
                assert_eq!(h.available(product).await, 8);
            }
            None => {
                assert!(hold.is_none());
                assert_eq!(h.available(product).await, 10);
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_empty_stock_orders_allow_one() {
    let h = TestHarness::new();
    let author = h.author().await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let stock_orders = h.inventory.stock_orders().clone();
            tokio::spawn(async move { stock_orders.create_empty_stock_order(author).await })
        })
        .collect();
    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => assert_eq!(e.reason(), ReasonCode::EmptyStockOrderAlreadyExists),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(h.store.in_progress_stock_orders(author).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_lowered_count_refuses_new_holds() {
    let h = TestHarness::new();
    let author = h.author().await;
    let product = h.product(5).await;
    let ledger = h.inventory.ledger();

    ledger
        .create_or_update_reservation(product, author, 2, OrderId::new(), false)
        .await
        .unwrap();
    h.store.update_product_count(product, 3).await.unwrap();

    let err = ledger
        .create_or_update_reservation(product, author, 2, OrderId::new(), false)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), ReasonCode::NotEnoughProductQuantityInStock);
    assert_eq!(h.available(product).await, 1);
}

#[tokio::test]
async fn test_sweeper_keeps_committed_holds() {
    let h = TestHarness::new();
    let committed_author = h.author().await;
    let cart_author = h.author().await;
    let product = h.product(10).await;
    let orders = h.inventory.orders();

    orders.create_or_add(committed_author, product, 2).await.unwrap();
    orders
        .to_order(committed_author, CheckoutRequest::default())
        .await
        .unwrap();
    let cart = orders.create_or_add(cart_author, product, 3).await.unwrap();

    let report = h
        .inventory
        .sweeper()
        .sweep_once(Utc::now() + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.released, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(h.available(product).await, 8);

    let view = orders.get_order(cart.order.id()).await.unwrap();
    assert_eq!(view.items[0].held_quantity, 0);
    assert_eq!(view.items[0].item.reserved, None);
}

#[tokio::test]
async fn test_committed_holds_do_not_stall_the_sweep() {
    let h = TestHarness::new();
    let product = h.product(10).await;
    let orders = h.inventory.orders();

    for _ in 0..2 {
        let author = h.author().await;
        orders.create_or_add(author, product, 1).await.unwrap();
        orders
            .to_order(author, CheckoutRequest::default())
            .await
            .unwrap();
    }
    let cart_author = h.author().await;
    orders.create_or_add(cart_author, product, 3).await.unwrap();
    assert_eq!(h.available(product).await, 5);

    let report = h
        .inventory
        .sweeper()
        .with_batch_size(2)
        .sweep_once(Utc::now() + Duration::days(3))
        .await
        .unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(h.available(product).await, 8);
}

#[tokio::test]
async fn test_remove_reservation_is_idempotent() {
    let h = TestHarness::new();
    let author = h.author().await;
    let product = h.product(10).await;
    let order = OrderId::new();
    let ledger = h.inventory.ledger();

    ledger
        .create_or_update_reservation(product, author, 4, order, false)
        .await
        .unwrap();
    assert!(ledger.remove_reservation(product, author, order).await.unwrap().is_some());
    assert!(ledger.remove_reservation(product, author, order).await.unwrap().is_none());
    assert_eq!(h.available(product).await, 10);
}

#[tokio::test]
async fn test_unknown_and_blocked_authors() {
    let h = TestHarness::new();
    let product = h.product(10).await;

    let err = h
        .inventory
        .orders()
        .create_or_add(UserId::new(), product, 1)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), ReasonCode::UserNotFound);

    let banned = UserId::new();
    let mut profile = AuthorProfile::active(banned, "Bob");
    profile.banned = true;
    h.users.insert(profile).await;
    let err = h
        .inventory
        .orders()
        .create_or_add(banned, product, 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(err.reason(), ReasonCode::UserBanned);

    let author = h.author().await;
    let err = h
        .inventory
        .orders()
        .create_or_add(author, ProductId::new(), 1)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), ReasonCode::ProductNotFound);
}

#[tokio::test]
async fn test_failed_first_add_leaves_no_empty_cart() {
    let h = TestHarness::new();
    let author = h.author().await;
    let product = h.product(2).await;

    let err = h
        .inventory
        .orders()
        .create_or_add(author, product, 3)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), ReasonCode::NotEnoughProductQuantityInStock);

    let err = h
        .inventory
        .orders()
        .get_order_in_progress(author)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), ReasonCode::OrderNotFound);
}

#[tokio::test]
async fn test_deleting_last_item_deletes_order() {
    let h = TestHarness::new();
    let author = h.author().await;
    let a = h.product(10).await;
    let b = h.product(10).await;
    let orders = h.inventory.orders();

    orders.create_or_add(author, a, 2).await.unwrap();
    let view = orders.create_or_add(author, b, 2).await.unwrap();
    let order = view.order.id();
    let item_a = view.item_for(a).unwrap().item.id;
    let item_b = view.item_for(b).unwrap().item.id;

    let remaining = orders.delete_order_item(order, item_a).await.unwrap().unwrap();
    assert_eq!(remaining.items.len(), 1);
    assert_eq!(h.available(a).await, 10);

    assert!(orders.delete_order_item(order, item_b).await.unwrap().is_none());
    assert_eq!(h.available(b).await, 10);
    let err = orders.get_order(order).await.unwrap_err();
    assert_eq!(err.reason(), ReasonCode::OrderNotFound);
}

#[tokio::test]
async fn test_order_listings() {
    let h = TestHarness::new();
    let author = h.author().await;
    let product = h.product(20).await;
    let orders = h.inventory.orders();

    let placed = orders.create_or_add(author, product, 1).await.unwrap().order.id();
    orders.to_order(author, CheckoutRequest::default()).await.unwrap();
    let rejected = orders.create_or_add(author, product, 1).await.unwrap().order.id();
    orders.to_order(author, CheckoutRequest::default()).await.unwrap();
    orders
        .change_order_status(rejected, Some(OrderStatus::Rejected))
        .await
        .unwrap();
    orders.create_or_add(author, product, 1).await.unwrap();

    let all = orders.list_orders_by_author(author, Page::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let active = orders.list_active_orders(Page::default()).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, placed);

    let history = orders.list_order_history(Page::default()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, rejected);
}

#[tokio::test]
async fn test_stock_order_flow() {
    let h = TestHarness::new();
    let staff = h.author().await;
    let product = h.product(10).await;
    let stock = h.inventory.stock_orders();

    let order = stock.create_empty_stock_order(staff).await.unwrap().id;
    let err = stock.create_empty_stock_order(staff).await.unwrap_err();
    assert_eq!(err.reason(), ReasonCode::EmptyStockOrderAlreadyExists);

    stock
        .add_product_to_stock_order(order, product, 4)
        .await
        .unwrap();
    let err = stock
        .add_product_to_stock_order(order, product, 1)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), ReasonCode::OrderItemAlreadyAdded);

    let hold = h
        .inventory
        .ledger()
        .get_reservation_by_product_and_order(product, order)
        .await
        .unwrap()
        .unwrap();
    assert!(hold.for_stock);
    assert_eq!(hold.expires_at - hold.reserved_at, Duration::days(2));

    let err = stock.confirm_stock_order(order).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.reason(), ReasonCode::CounterpartyRequired);

    stock
        .update_stock_order(
            order,
            StockOrderUpdate {
                counterparty: Some(Counterparty {
                    id: "cp-7".to_string(),
                    name: "Acme".to_string(),
                }),
                pricing: Some(PricingProfile::new(
                    PriceTier::Wholesale,
                    DiscountPercent::new(25),
                )),
                items: vec![ItemQuantity {
                    product,
                    quantity: 6,
                }],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(h.available(product).await, 4);

    let confirmed = stock.confirm_stock_order(order).await.unwrap();
    let record = confirmed.order.as_stock().unwrap();
    assert_eq!(record.status(), StockOrderStatus::Confirmed);
    assert_eq!(record.total, Some(Money::from_cents(3600)));
    assert_eq!(h.upstream.submissions().await[0].counterparty_id, "cp-7");

    let err = stock
        .add_product_to_stock_order(order, h.product(3).await, 1)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), ReasonCode::OrderNotInProgress);

    stock
        .change_stock_order_status(order, Some(StockOrderStatus::Rejected))
        .await
        .unwrap();
    assert_eq!(h.available(product).await, 10);

    stock
        .change_stock_order_status(order, Some(StockOrderStatus::Confirmed))
        .await
        .unwrap();
    assert_eq!(h.available(product).await, 4);
    assert_eq!(h.upstream.submission_count().await, 1);

    stock
        .change_stock_order_status(order, Some(StockOrderStatus::Completed))
        .await
        .unwrap();
    assert_eq!(h.available(product).await, 10);

    let listed = stock
        .list_stock_orders(Some(staff), Some(StockOrderStatus::Completed), Page::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_stock_update_is_all_or_nothing() {
    let h = TestHarness::new();
    let staff = h.author().await;
    let plenty = h.product(10).await;
    let scarce = h.product(3).await;
    let stock = h.inventory.stock_orders();

    let order = stock.create_empty_stock_order(staff).await.unwrap().id;
    stock.add_product_to_stock_order(order, plenty, 2).await.unwrap();
    stock.add_product_to_stock_order(order, scarce, 1).await.unwrap();

    let err = stock
        .update_stock_order(
            order,
            StockOrderUpdate {
                necessary_notes: Some("rush".to_string()),
                items: vec![
                    ItemQuantity {
                        product: plenty,
                        quantity: 9,
                    },
                    ItemQuantity {
                        product: scarce,
                        quantity: 5,
                    },
                ],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.reason(), ReasonCode::NotEnoughProductQuantityInStock);

    assert_eq!(h.available(plenty).await, 8);
    assert_eq!(h.available(scarce).await, 2);
    let view = stock.get_stock_order(order).await.unwrap();
    assert_eq!(view.item_for(plenty).unwrap().item.item_count, 2);
    assert_eq!(view.order.as_stock().unwrap().necessary_notes, "");
}

#[tokio::test]
async fn test_remove_all_user_reservations() {
    let h = TestHarness::new();
    let author = h.author().await;
    let a = h.product(10).await;
    let b = h.product(10).await;

    h.inventory.orders().create_or_add(author, a, 1).await.unwrap();
    h.inventory.orders().create_or_add(author, b, 2).await.unwrap();

    let ledger = h.inventory.ledger();
    assert_eq!(ledger.get_user_reservations(author).await.unwrap().len(), 2);
    assert_eq!(ledger.remove_all_user_reservations(author).await.unwrap(), 2);

    let err = ledger.remove_all_user_reservations(author).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.reason(), ReasonCode::NoReservationsFound);
}
