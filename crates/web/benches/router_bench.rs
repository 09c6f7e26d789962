use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use http::{Method, Request};
use quill_web::router::{get, on, post};
use quill_web::{Flow, Router, handler_fn};
use std::hint::black_box;
use std::sync::Arc;

fn router(routes: usize) -> Router {
    let mut builder = Router::builder();
    builder.mount("/", Arc::new(handler_fn(|req, _resp| {
        req.init_context();
        Ok(Flow::Next)
    })));

    for index in 0..routes {
        let path = format!("/service_{index}");
        builder
            .route(path.as_str(), get(handler_fn(|_req, _resp| Ok(Flow::Next))))
            .route(path.as_str(), post(handler_fn(|_req, _resp| Ok(Flow::Next))))
            .route(path.as_str(), on(Method::DELETE, handler_fn(|_req, _resp| Ok(Flow::Next))));
    }

    for index in 0..routes {
        builder.mount(format!("/service_{index}"), Arc::new(handler_fn(|_req, resp| {
            resp.finish("done");
            Ok(Flow::Halt)
        })));
    }

    builder.build().expect("bench routes should be valid")
}

fn benchmark_dispatch(criterion: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().build().expect("runtime should build");
    let mut group = criterion.benchmark_group("dispatch");

    for routes in [1, 16, 64] {
        let router = router(routes);
        let last = format!("/service_{}", routes - 1);

        group.bench_with_input(BenchmarkId::from_parameter(routes), &last, |b, path| {
            b.to_async(&runtime).iter(|| async {
                let request = Request::builder().method(Method::GET).uri(path.as_str()).body(Bytes::new()).unwrap();
                black_box(router.dispatch(request).await)
            });
        });
    }

    group.finish();
}

criterion_group!(dispatch, benchmark_dispatch);
criterion_main!(dispatch);
