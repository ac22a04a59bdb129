use proptest::prelude::*;
use readshelf::models::*;
use readshelf::{AppState, Config};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn status() -> impl Strategy<Value = ReadingStatus> {
    prop_oneof![
        Just(ReadingStatus::ToRead),
        Just(ReadingStatus::Reading),
        Just(ReadingStatus::Completed),
        Just(ReadingStatus::Dropped),
        Just(ReadingStatus::OnHold),
    ]
}

fn tags() -> impl Strategy<Value = Vec<String>> {
    proptest::sample::subsequence(vec!["x", "y", "z"], 0..=3)
        .prop_map(|tags| tags.into_iter().map(str::to_string).collect())
}

fn title() -> impl Strategy<Value = &'static str> {
    proptest::sample::select(vec!["Alpha", "beta ABC", "Gamma abc", "Delta", "abcdef"])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn like_toggles_net_out_by_parity(toggles in 1usize..8) {
        runtime().block_on(async {
            let app = AppState::in_memory(Config::default()).await.unwrap();
            let list = app
                .custom_list_service
                .create(
                    "owner",
                    "Owner",
                    CreateCustomListRequest {
                        name: "Favs".to_string(),
                        description: None,
                        visibility: ListVisibility::Public,
                        cover_image: None,
                        readings: Vec::new(),
                    },
                )
                .await
                .unwrap();

            let mut liked = false;
            for _ in 0..toggles {
                liked = app.custom_list_service.toggle_like(&list.id, "viewer").await.unwrap();
            }

            let stored = app.custom_list_service.get_by_id(&list.id).await.unwrap().unwrap();
            assert_eq!(liked, toggles % 2 == 1);
            assert_eq!(app.custom_list_service.has_user_liked(&list.id, "viewer").await.unwrap(), liked);
            assert_eq!(stored.likes_count, (toggles % 2) as i64);
        });
    }

    #[test]
    fn filters_apply_as_a_conjunction(
        items in proptest::collection::vec((title(), status(), tags()), 0..12),
        wanted_status in proptest::option::of(status()),
        wanted_tags in tags(),
        search in proptest::option::of(proptest::sample::select(vec!["abc", "ALP", "zzz"])),
    ) {
        runtime().block_on(async {
            let app = AppState::in_memory(Config::default()).await.unwrap();
            let mut expected = Vec::new();
            for (title, status, tags) in &items {
                let request = CreateReadingRequest {
                    tags: tags.clone(),
                    ..CreateReadingRequest::new(title, ReadingCategory::Manga, *status)
                };
                let reading = app.reading_service.create("reader", request).await.unwrap();

                let status_ok = wanted_status.map_or(true, |s| s == *status);
                let tags_ok = wanted_tags.is_empty() || tags.iter().any(|t| wanted_tags.contains(t));
                let search_ok = search.map_or(true, |q| title.to_lowercase().contains(&q.to_lowercase()));
                if status_ok && tags_ok && search_ok {
                    expected.push(reading.id);
                }
            }

            let filters = ReadingFilters {
                status: wanted_status,
                tags: wanted_tags.clone(),
                search_query: search.map(str::to_string),
                ..Default::default()
            };
            let mut actual: Vec<String> = app
                .reading_service
                .get_by_user_id("reader", Some(&filters))
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect();

            actual.sort();
            expected.sort();
            assert_eq!(actual, expected);
        });
    }
}
